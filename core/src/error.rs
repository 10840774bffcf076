use thiserror::Error;

use crate::TermId;

/// Errors raised by index construction, lookup and ranking.
#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot {operation} while index is {state}")]
    StateViolation {
        operation: &'static str,
        state: &'static str,
    },

    #[error("corrupt postings record at byte {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    #[error("invalid ranking model selection: {0:?}")]
    InvalidQuerySelection(String),

    #[error("no precomputed statistic for term id {term_id}")]
    MissingStatistic { term_id: TermId },

    #[error("invalid relevance file {path}: {reason}")]
    InvalidRelevance { path: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        Error::CorruptRecord { offset, reason: reason.into() }
    }

    /// True for errors that mean the on-disk postings cannot be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::CorruptRecord { .. })
    }
}
