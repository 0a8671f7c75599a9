//! Capability URLs for direct-to-store document upload.
//!
//! Large binaries never travel through the API: the gateway issues a
//! short-lived, write-and-create-only URL bound to a deterministic blob
//! path, the client uploads straight to the object store, and the
//! blob-event reactor later claims the upload by path. The
//! [`ObjectStore`] trait is the seam; [`MemoryObjectStore`] implements it
//! in-process with real signature/expiry checks so the whole subflow is
//! testable.

mod capability;
mod error;
mod path;
mod store;

pub use capability::{CapabilityIssuer, IssuedUpload, UploadRequest, UploadValidation};
pub use error::BlobError;
pub use path::{blob_path, parse_blob_path, sanitize_filename, ParsedBlobPath};
pub use store::{BlobMeta, MemoryObjectStore, ObjectStore, UPLOAD_URL_TTL};
