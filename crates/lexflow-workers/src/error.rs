//! Worker errors.
//!
//! `Malformed` dead-letters immediately; everything else abandons the
//! delivery so the broker redelivers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Message payload cannot be deserialized. Never retried.
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error(transparent)]
    Queue(#[from] lexflow_queue::QueueError),

    #[error(transparent)]
    Db(#[from] lexflow_db::DbError),

    #[error(transparent)]
    Blob(#[from] lexflow_blob::BlobError),
}

impl WorkerError {
    /// Whether this failure should dead-letter instead of redeliver.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, WorkerError::Malformed(_))
    }
}
