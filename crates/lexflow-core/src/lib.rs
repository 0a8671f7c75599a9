//! Shared vocabulary for the lexflow ingestion plane.
//!
//! This crate holds the types every other crate agrees on: tenant
//! identifiers and their session-name normalization, the API scope set,
//! webhook event names, and the wire-level error codes. It deliberately
//! has no I/O dependencies.

mod error;
mod event;
mod limits;
mod scope;
mod tenant;

pub use error::ErrorCode;
pub use event::WebhookEventKind;
pub use limits::RateLimitProfile;
pub use scope::{Scope, ScopeParseError};
pub use tenant::{
    demographics_session, display_tenant_from_session, webhook_session, InvalidTenantId, TenantId,
    DEMOGRAPHICS_SESSION_PREFIX, SYSTEM_WEBHOOK_SESSION, WEBHOOK_SESSION_PREFIX,
};
