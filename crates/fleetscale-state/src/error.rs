//! Errors raised by the history store.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot open history store at {location}: {reason}")]
    Open { location: String, reason: String },

    /// A redb transaction, table or range operation failed.
    #[error("history store {op} failed: {reason}")]
    Storage { op: &'static str, reason: String },

    #[error("cannot encode history record for cluster '{cluster_id}': {source}")]
    Encode {
        cluster_id: String,
        source: serde_json::Error,
    },

    #[error("corrupt history record for cluster '{cluster_id}' at {recorded_at}: {source}")]
    Decode {
        cluster_id: String,
        recorded_at: u64,
        source: serde_json::Error,
    },
}
