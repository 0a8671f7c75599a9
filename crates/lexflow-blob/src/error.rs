//! Blob subsystem errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    /// Object store rejected or failed the operation.
    #[error("object store error: {0}")]
    Store(String),

    /// A path did not match the issued naming convention.
    #[error("invalid blob path: {0}")]
    InvalidPath(String),

    /// A capability URL was used past its expiry.
    #[error("capability URL expired")]
    UrlExpired,

    /// A capability URL carried a bad or foreign signature.
    #[error("capability URL signature mismatch")]
    SignatureMismatch,

    /// Write-and-create-only: the blob already exists.
    #[error("blob already exists: {0}")]
    AlreadyExists(String),

    /// Upload content type does not match the one the URL was bound to.
    #[error("content type mismatch: URL bound to {expected}, got {actual}")]
    ContentTypeMismatch { expected: String, actual: String },

    /// Descriptor persistence failed.
    #[error(transparent)]
    Db(#[from] lexflow_db::DbError),
}
