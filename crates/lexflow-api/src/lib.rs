//! HTTP gateway for the lexflow ingestion plane.
//!
//! The request pipeline is middleware, ordered: correlation id →
//! authentication → scope authorization → rate limiting → validation →
//! (write routes) idempotency. Validation runs before the idempotency
//! layer so a rejected request never claims its key. Failures
//! short-circuit into the common error envelope. Handlers persist,
//! enqueue, and acknowledge; nothing user-visible waits on background
//! processing.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
mod openapi;
mod router;
mod state;
pub mod validation;

pub use error::{ApiError, ErrorBody};
pub use openapi::ApiDoc;
pub use router::build_router;
pub use state::AppState;
