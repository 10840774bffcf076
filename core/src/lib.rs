//! Term-level inverted index with boolean and vector-space retrieval.
//!
//! Postings are built through an [`IndexBackend`], either held in memory
//! ([`InMemoryIndex`]) or spilled to a single sorted run on disk with a
//! bounded buffer ([`DiskIndex`]). Queries go through a [`QueryEngine`] and a
//! [`RankingModel`].

pub mod cleaner;
pub mod disk;
pub mod error;
pub mod evaluation;
pub mod index;
pub mod memory;
pub mod persist;
pub mod query;
pub mod ranking;
pub mod run;
pub mod stats;

pub use cleaner::{Cleaner, CleanerConfig, Language, TextCleaner};
pub use disk::{DiskIndex, DiskIndexConfig, TermLocation, DEFAULT_BUFFER_CAPACITY};
pub use error::{Error, Result};
pub use evaluation::{evaluate, load_relevance, CutoffMetrics, Evaluation, RelevanceMap, DEFAULT_CUTOFFS};
pub use index::{DocId, IndexBackend, PostingRecord, TermCatalog, TermId};
pub use memory::InMemoryIndex;
pub use query::{ModelChoice, QueryEngine, QueryVectorizer};
pub use ranking::{
    BooleanOperator, BooleanRankingModel, PostingLists, QueryTerm, QueryVector, RankingModel,
    VectorRankingModel,
};
pub use run::{ReadOutcome, RECORD_SIZE};
pub use stats::PrecomputedStatistics;
