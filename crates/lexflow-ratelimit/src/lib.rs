//! Four-window rate limiting per credential.
//!
//! Every credential carries one limit per window (burst/minute/hour/day).
//! The limiter keys fixed-window counters in a backing [`CounterStore`]
//! and refuses with the most-restrictive window's metadata. When the
//! store is unreachable it fails open rather than taking the ingest path
//! down; the degraded state is readable by health output.

mod limiter;
mod store;
mod window;

pub use limiter::{RateLimitDecision, RateLimiter};
pub use store::{CounterStore, MemoryCounterStore, StoreError};
pub use window::WindowKind;
