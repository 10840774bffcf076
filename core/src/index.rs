use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::error::Result;

pub type TermId = u32;
pub type DocId = u64;

/// One occurrence of a term in a document.
///
/// Records order by `term_id`, then `doc_id`, which is the layout of every
/// sorted run and of the finalized postings file. Identity ignores
/// `term_freq`: two records for the same term and document are the same
/// posting and must be merged by adding their frequencies.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PostingRecord {
    pub doc_id: DocId,
    pub term_id: TermId,
    pub term_freq: u32,
}

impl PostingRecord {
    pub fn new(doc_id: DocId, term_id: TermId, term_freq: u32) -> Self {
        Self { doc_id, term_id, term_freq }
    }

    #[inline]
    pub fn key(&self) -> (TermId, DocId) {
        (self.term_id, self.doc_id)
    }
}

impl PartialEq for PostingRecord {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for PostingRecord {}

impl Hash for PostingRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for PostingRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PostingRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Dense term ids in first-seen order.
#[derive(Debug, Default, Clone)]
pub struct TermCatalog {
    ids: HashMap<String, TermId>,
    terms: Vec<String>,
}

impl TermCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a catalog from its terms listed in id order.
    pub fn from_terms(terms: Vec<String>) -> Self {
        let ids = terms
            .iter()
            .enumerate()
            .map(|(id, term)| (term.clone(), id as TermId))
            .collect();
        Self { ids, terms }
    }

    pub fn get_or_create_id(&mut self, term: &str) -> TermId {
        if let Some(&id) = self.ids.get(term) {
            return id;
        }
        let id = self.terms.len() as TermId;
        self.ids.insert(term.to_string(), id);
        self.terms.push(term.to_string());
        id
    }

    pub fn lookup_id(&self, term: &str) -> Option<TermId> {
        self.ids.get(term).copied()
    }

    pub fn term(&self, id: TermId) -> Option<&str> {
        self.terms.get(id as usize).map(String::as_str)
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Storage of term postings, built once and then queried.
///
/// `index` is only valid before `finalize`; lookups of terms the catalog
/// does not know yield no postings rather than an error. Document ids live
/// only inside postings.
pub trait IndexBackend {
    fn index(&mut self, term: &str, doc_id: DocId, term_freq: u32) -> Result<()>;

    fn finalize(&mut self) -> Result<()>;

    fn is_finalized(&self) -> bool;

    fn catalog(&self) -> &TermCatalog;

    /// Postings of `term` ordered by document id.
    fn occurrences(&self, term: &str) -> Result<Vec<PostingRecord>>;

    fn document_count_with(&self, term: &str) -> Result<usize>;

    /// Visit every posting in `(term_id, doc_id)` order.
    fn for_each_posting(&self, visit: &mut dyn FnMut(&PostingRecord)) -> Result<()>;

    fn term_id(&self, term: &str) -> Option<TermId> {
        self.catalog().lookup_id(term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn records_order_by_term_then_doc() {
        let mut v = vec![
            PostingRecord::new(9, 1, 1),
            PostingRecord::new(3, 2, 1),
            PostingRecord::new(1, 1, 5),
        ];
        v.sort();
        let keys: Vec<_> = v.iter().map(PostingRecord::key).collect();
        assert_eq!(keys, vec![(1, 1), (1, 9), (2, 3)]);
    }

    #[test]
    fn frequency_is_not_identity() {
        let a = PostingRecord::new(4, 7, 1);
        let b = PostingRecord::new(4, 7, 3);
        assert_eq!(a, b);
        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn catalog_assigns_ids_in_first_seen_order() {
        let mut c = TermCatalog::new();
        assert_eq!(c.get_or_create_id("irlanda"), 0);
        assert_eq!(c.get_or_create_id("que"), 1);
        assert_eq!(c.get_or_create_id("irlanda"), 0);
        assert_eq!(c.lookup_id("espero"), None);
        assert_eq!(c.len(), 2);
        assert_eq!(c.term(1), Some("que"));
    }

    #[test]
    fn catalog_round_trips_through_term_list() {
        let mut c = TermCatalog::new();
        for t in ["b", "a", "c"] {
            c.get_or_create_id(t);
        }
        let rebuilt = TermCatalog::from_terms(c.terms().to_vec());
        assert_eq!(rebuilt.lookup_id("a"), Some(1));
        assert_eq!(rebuilt.lookup_id("c"), Some(2));
    }
}
