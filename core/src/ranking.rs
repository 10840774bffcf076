use std::collections::{BTreeSet, HashMap};

use crate::error::{Error, Result};
use crate::index::{DocId, PostingRecord, TermId};
use crate::stats::PrecomputedStatistics;

/// The query-side occurrence of a term: no document, just the in-query count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTerm {
    pub term_id: TermId,
    pub term_freq: u32,
}

/// Query terms known to the index, keyed by term.
pub type QueryVector = HashMap<String, QueryTerm>;

/// Posting list of every query term, keyed by term.
pub type PostingLists = HashMap<String, Vec<PostingRecord>>;

pub trait RankingModel {
    fn name(&self) -> &'static str;

    /// Documents answering `query`, best first.
    fn ordered_docs(&self, query: &QueryVector, postings: &PostingLists) -> Result<Vec<DocId>>;
}

fn postings_for<'p>(postings: &'p PostingLists, term: &str) -> &'p [PostingRecord] {
    postings.get(term).map(Vec::as_slice).unwrap_or(&[])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOperator {
    And,
    Or,
}

/// Exact-match retrieval. Results carry no relevance order and are returned
/// by ascending document id.
#[derive(Debug, Clone, Copy)]
pub struct BooleanRankingModel {
    operator: BooleanOperator,
}

impl BooleanRankingModel {
    pub fn new(operator: BooleanOperator) -> Self {
        Self { operator }
    }

    pub fn operator(&self) -> BooleanOperator {
        self.operator
    }
}

impl RankingModel for BooleanRankingModel {
    fn name(&self) -> &'static str {
        match self.operator {
            BooleanOperator::And => "boolean-and",
            BooleanOperator::Or => "boolean-or",
        }
    }

    fn ordered_docs(&self, query: &QueryVector, postings: &PostingLists) -> Result<Vec<DocId>> {
        let mut sets: Vec<BTreeSet<DocId>> = query
            .keys()
            .map(|term| postings_for(postings, term).iter().map(|p| p.doc_id).collect())
            .collect();

        let docs = match self.operator {
            BooleanOperator::Or => sets.into_iter().flatten().collect::<BTreeSet<_>>(),
            BooleanOperator::And => {
                sets.sort_by_key(BTreeSet::len);
                let mut iter = sets.into_iter();
                match iter.next() {
                    None => BTreeSet::new(),
                    Some(first) => iter.fold(first, |acc, set| &acc & &set),
                }
            }
        };
        Ok(docs.into_iter().collect())
    }
}

/// Cosine-style ranking over `tf * idf` weights.
///
/// Each matched document scores
/// `sum(tf_doc * tf_query * idf) / (query_norm * doc_norm)`; documents no
/// query term points at are not scored at all. The query norm scales every
/// score equally, so it never changes the order.
#[derive(Debug, Clone, Copy)]
pub struct VectorRankingModel<'a> {
    stats: &'a PrecomputedStatistics,
}

impl<'a> VectorRankingModel<'a> {
    pub fn new(stats: &'a PrecomputedStatistics) -> Self {
        Self { stats }
    }

    /// Matched documents with their scores, highest first, ties by
    /// ascending document id.
    pub fn scored_docs(&self, query: &QueryVector, postings: &PostingLists) -> Result<Vec<(DocId, f64)>> {
        let mut dot: HashMap<DocId, f64> = HashMap::new();
        let mut query_sq = 0.0;
        for (term, query_term) in query {
            let idf = self
                .stats
                .idf(query_term.term_id)
                .ok_or(Error::MissingStatistic { term_id: query_term.term_id })?;
            let tf_query = query_term.term_freq as f64;
            query_sq += (tf_query * idf).powi(2);
            for posting in postings_for(postings, term) {
                *dot.entry(posting.doc_id).or_insert(0.0) += posting.term_freq as f64 * tf_query * idf;
            }
        }

        let query_norm = query_sq.sqrt();
        let mut scored: Vec<(DocId, f64)> = dot
            .into_iter()
            .map(|(doc_id, dot)| {
                let denominator = query_norm * self.stats.norm(doc_id).unwrap_or(0.0);
                let score = if denominator > 0.0 { dot / denominator } else { 0.0 };
                (doc_id, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(scored)
    }
}

impl RankingModel for VectorRankingModel<'_> {
    fn name(&self) -> &'static str {
        "vector"
    }

    fn ordered_docs(&self, query: &QueryVector, postings: &PostingLists) -> Result<Vec<DocId>> {
        Ok(self.scored_docs(query, postings)?.into_iter().map(|(doc, _)| doc).collect())
    }
}
