use std::fmt;
use std::str::FromStr;

use crate::cleaner::Cleaner;
use crate::error::{Error, Result};
use crate::index::{DocId, IndexBackend, TermCatalog};
use crate::ranking::{
    BooleanOperator, BooleanRankingModel, PostingLists, QueryTerm, QueryVector, RankingModel,
    VectorRankingModel,
};
use crate::stats::PrecomputedStatistics;

/// Builds query vectors from raw query text.
pub struct QueryVectorizer<C> {
    cleaner: C,
}

impl<C: Cleaner> QueryVectorizer<C> {
    pub fn new(cleaner: C) -> Self {
        Self { cleaner }
    }

    /// Count each cleaned query token, dropping tokens the catalog does not
    /// know since they cannot match any document.
    pub fn vectorize(&self, query: &str, catalog: &TermCatalog) -> QueryVector {
        let mut vector = QueryVector::new();
        for token in self.cleaner.clean(query) {
            let Some(term_id) = catalog.lookup_id(&token) else {
                continue;
            };
            vector.entry(token).or_insert(QueryTerm { term_id, term_freq: 0 }).term_freq += 1;
        }
        vector
    }
}

pub struct QueryEngine<'a, C> {
    index: &'a dyn IndexBackend,
    vectorizer: QueryVectorizer<C>,
}

impl<'a, C: Cleaner> QueryEngine<'a, C> {
    pub fn new(index: &'a dyn IndexBackend, cleaner: C) -> Self {
        Self { index, vectorizer: QueryVectorizer::new(cleaner) }
    }

    pub fn vectorize(&self, query: &str) -> QueryVector {
        self.vectorizer.vectorize(query, self.index.catalog())
    }

    pub fn posting_lists(&self, query: &QueryVector) -> Result<PostingLists> {
        query
            .keys()
            .map(|term| Ok((term.clone(), self.index.occurrences(term)?)))
            .collect()
    }

    /// Documents answering `query` under `model`, best first.
    pub fn answer(&self, query: &str, model: &dyn RankingModel) -> Result<Vec<DocId>> {
        if !self.index.is_finalized() {
            return Err(Error::StateViolation { operation: "answer queries", state: "building" });
        }
        let vector = self.vectorize(query);
        let postings = self.posting_lists(&vector)?;
        let docs = model.ordered_docs(&vector, &postings)?;
        tracing::debug!(query, model = model.name(), terms = vector.len(), hits = docs.len(), "answered query");
        Ok(docs)
    }
}

/// A ranking model selected by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelChoice {
    BooleanAnd,
    BooleanOr,
    Vector,
}

impl ModelChoice {
    /// Instantiate the model; the vector model needs statistics.
    pub fn build<'a>(self, stats: Option<&'a PrecomputedStatistics>) -> Result<Box<dyn RankingModel + 'a>> {
        Ok(match self {
            ModelChoice::BooleanAnd => Box::new(BooleanRankingModel::new(BooleanOperator::And)),
            ModelChoice::BooleanOr => Box::new(BooleanRankingModel::new(BooleanOperator::Or)),
            ModelChoice::Vector => match stats {
                Some(stats) => Box::new(VectorRankingModel::new(stats)),
                None => {
                    return Err(Error::InvalidQuerySelection(
                        "vector model requires precomputed statistics".into(),
                    ))
                }
            },
        })
    }
}

impl FromStr for ModelChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "and" | "boolean-and" => Ok(ModelChoice::BooleanAnd),
            "or" | "boolean-or" => Ok(ModelChoice::BooleanOr),
            "vector" | "vsm" => Ok(ModelChoice::Vector),
            _ => Err(Error::InvalidQuerySelection(s.to_string())),
        }
    }
}

impl fmt::Display for ModelChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelChoice::BooleanAnd => "boolean-and",
            ModelChoice::BooleanOr => "boolean-or",
            ModelChoice::Vector => "vector",
        })
    }
}
