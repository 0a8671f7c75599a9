//! Background workers of the ingestion plane.
//!
//! - [`DemographicsWorkerPool`]: leases `demographics-fifo` sessions,
//!   applies the per-record state machine, emits `demographics.processed`
//!   webhooks.
//! - [`DocumentWorker`]: consumes the unordered `documents` topic.
//! - [`BlobEventReactor`]: turns object-store completion events into
//!   validated uploads and `document.uploaded` webhooks.
//! - [`DeadLetterMonitor`]: records terminal outcomes and emits
//!   `demographics.failed` webhooks.

mod dead_letter;
mod demographics;
mod documents;
mod error;
mod reactor;
mod sizing;

pub use dead_letter::DeadLetterMonitor;
pub use demographics::{DemographicsJob, DemographicsWorkerPool, RecordAction, RecordEnvelope};
pub use documents::{DocumentJob, DocumentWorker};
pub use error::WorkerError;
pub use reactor::{BlobEventReactor, BlobWrittenEvent};
pub use sizing::{effective_pool_size, free_memory_mb, resident_memory_mb};
