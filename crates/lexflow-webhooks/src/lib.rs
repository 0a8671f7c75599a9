//! Outbound webhook delivery.
//!
//! Consumes the `webhooks-fifo` topic session by session, signs payloads
//! with HMAC-SHA256 over canonical JSON, POSTs to per-tenant endpoints,
//! and schedules exponential-backoff retries as successor messages on the
//! same session — the session stays free during the wait, per-tenant
//! order is preserved, and every attempt lands in the append-only audit.

mod dispatcher;
mod error;
mod payload;
mod signing;
mod targets;

pub use dispatcher::{backoff_ms, WebhookDispatcher, WebhookDispatcherConfig, MAX_BACKOFF_MS};
pub use error::WebhookError;
pub use payload::{WebhookJob, WebhookPayload};
pub use signing::{canonical_json, sign_payload, signature_for, verify_payload};
pub use targets::TargetResolver;
