use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::index::{DocId, IndexBackend, PostingRecord, TermCatalog};

/// Postings held entirely in memory, one bucket per term id.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    catalog: TermCatalog,
    // buckets[term_id]: doc_id -> term_freq
    buckets: Vec<BTreeMap<DocId, u32>>,
    finalized: bool,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexBackend for InMemoryIndex {
    fn index(&mut self, term: &str, doc_id: DocId, term_freq: u32) -> Result<()> {
        if self.finalized {
            return Err(Error::StateViolation { operation: "index", state: "finalized" });
        }
        if term_freq == 0 {
            return Ok(());
        }
        let term_id = self.catalog.get_or_create_id(term) as usize;
        if self.buckets.len() <= term_id {
            self.buckets.resize_with(term_id + 1, BTreeMap::new);
        }
        *self.buckets[term_id].entry(doc_id).or_insert(0) += term_freq;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Err(Error::StateViolation { operation: "finalize", state: "finalized" });
        }
        self.finalized = true;
        tracing::debug!(terms = self.catalog.len(), "in-memory index finalized");
        Ok(())
    }

    fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn catalog(&self) -> &TermCatalog {
        &self.catalog
    }

    fn occurrences(&self, term: &str) -> Result<Vec<PostingRecord>> {
        let Some(term_id) = self.catalog.lookup_id(term) else {
            return Ok(Vec::new());
        };
        let postings = self.buckets[term_id as usize]
            .iter()
            .map(|(&doc_id, &freq)| PostingRecord::new(doc_id, term_id, freq))
            .collect();
        Ok(postings)
    }

    fn document_count_with(&self, term: &str) -> Result<usize> {
        Ok(self
            .catalog
            .lookup_id(term)
            .map_or(0, |id| self.buckets[id as usize].len()))
    }

    fn for_each_posting(&self, visit: &mut dyn FnMut(&PostingRecord)) -> Result<()> {
        for (term_id, bucket) in self.buckets.iter().enumerate() {
            for (&doc_id, &freq) in bucket {
                visit(&PostingRecord::new(doc_id, term_id as u32, freq));
            }
        }
        Ok(())
    }
}
