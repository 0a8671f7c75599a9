//! Row models for the lexflow schema.

mod credential;
mod delivery_attempt;
mod demographic;
mod document;
mod idempotency;

pub use credential::{ApiCredential, CredentialStatus, NewApiCredential};
pub use delivery_attempt::{DeliveryAttempt, DeliveryStatus, NewDeliveryAttempt};
pub use demographic::{
    DemographicRecord, ListRecords, NewDemographicRecord, ProcessingState, RecordStatus,
};
pub use document::{DocumentStatus, DocumentUpload, NewDocumentUpload};
pub use idempotency::{IdempotentInsert, IdempotentRequest, NewIdempotentRequest};
