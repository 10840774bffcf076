use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::index::{DocId, IndexBackend, PostingRecord, TermId};

/// IDF per term and vector norm per document of a finalized index.
#[derive(Debug, Clone)]
pub struct PrecomputedStatistics {
    idf: Vec<f64>,
    norms: HashMap<DocId, f64>,
    document_count: u64,
}

impl PrecomputedStatistics {
    /// Count the documents with one scan of the postings, compute
    /// `idf = ln(N / df)` for every term, then scan again to accumulate each
    /// document's norm of `tf * idf` weights.
    ///
    /// The index itself keeps no document ids outside its postings, so `N`
    /// is derived here.
    pub fn build(index: &dyn IndexBackend) -> Result<Self> {
        if !index.is_finalized() {
            return Err(Error::StateViolation { operation: "precompute statistics", state: "building" });
        }
        let mut squares: HashMap<DocId, f64> = HashMap::new();
        index.for_each_posting(&mut |posting: &PostingRecord| {
            squares.entry(posting.doc_id).or_insert(0.0);
        })?;
        let document_count = squares.len() as u64;

        let n = document_count as f64;
        let mut idf = Vec::with_capacity(index.catalog().len());
        for term in index.catalog().terms() {
            let df = index.document_count_with(term)?;
            idf.push(if df == 0 { 0.0 } else { (n / df as f64).ln() });
        }

        let mut missing: Option<TermId> = None;
        index.for_each_posting(&mut |posting: &PostingRecord| match idf.get(posting.term_id as usize) {
            Some(&w) => {
                let weight = posting.term_freq as f64 * w;
                *squares.entry(posting.doc_id).or_insert(0.0) += weight * weight;
            }
            None => {
                missing.get_or_insert(posting.term_id);
            }
        })?;
        if let Some(term_id) = missing {
            return Err(Error::MissingStatistic { term_id });
        }

        let norms = squares.into_iter().map(|(doc, sq)| (doc, sq.sqrt())).collect::<HashMap<_, _>>();
        tracing::debug!(terms = idf.len(), docs = document_count, "precomputed vector statistics");
        Ok(Self { idf, norms, document_count })
    }

    pub fn idf(&self, term_id: TermId) -> Option<f64> {
        self.idf.get(term_id as usize).copied()
    }

    pub fn norm(&self, doc_id: DocId) -> Option<f64> {
        self.norms.get(&doc_id).copied()
    }

    pub fn document_count(&self) -> u64 {
        self.document_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryIndex;

    #[test]
    fn idf_and_norms() {
        let mut idx = InMemoryIndex::new();
        idx.index("a", 1, 2).unwrap();
        idx.index("b", 1, 1).unwrap();
        idx.index("b", 2, 1).unwrap();
        idx.finalize().unwrap();
        let stats = PrecomputedStatistics::build(&idx).unwrap();

        let idf_a = (2.0f64).ln();
        assert!((stats.idf(0).unwrap() - idf_a).abs() < 1e-12);
        assert_eq!(stats.idf(1).unwrap(), 0.0);
        assert!((stats.norm(1).unwrap() - 2.0 * idf_a).abs() < 1e-12);
        assert_eq!(stats.norm(2).unwrap(), 0.0);
        assert_eq!(stats.norm(3), None);
        assert_eq!(stats.document_count(), 2);
    }

    #[test]
    fn document_count_comes_from_postings() {
        let mut idx = InMemoryIndex::new();
        for (term, doc) in [("a", 7), ("b", 7), ("a", 3), ("c", 11), ("c", 3)] {
            idx.index(term, doc, 1).unwrap();
        }
        idx.index("d", 40, 0).unwrap();
        idx.finalize().unwrap();
        let stats = PrecomputedStatistics::build(&idx).unwrap();
        assert_eq!(stats.document_count(), 3);
        assert!((stats.idf(0).unwrap() - (1.5f64).ln()).abs() < 1e-12);
    }

    #[test]
    fn requires_finalized_index() {
        let idx = InMemoryIndex::new();
        assert!(matches!(PrecomputedStatistics::build(&idx), Err(Error::StateViolation { .. })));
    }
}
