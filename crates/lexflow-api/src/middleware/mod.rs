//! Gateway middleware, in pipeline order: correlation id →
//! authentication → scope authorization → rate limit → validation →
//! idempotency.

pub mod auth;
pub mod correlation;
pub mod idempotency;
pub mod rate_limit;
pub mod validation;

pub use auth::{auth_middleware, authorize_middleware, route_scopes, API_KEY_HEADER};
pub use correlation::{correlation_middleware, CorrelationId, CORRELATION_HEADER};
pub use idempotency::{idempotency_middleware, IDEMPOTENCY_HEADER, IDEMPOTENCY_REPLAYED_HEADER};
pub use rate_limit::rate_limit_middleware;
pub use validation::validation_middleware;
