//! Persistence layer for the lexflow ingestion plane.
//!
//! Wraps `SQLx`'s `PostgreSQL` pool, owns the SQL migrations, and exposes
//! the row models: demographic records, API credentials, idempotent
//! requests, document uploads, and webhook delivery attempts. Every
//! tenant-scoped query takes the tenant identifier explicitly; there is no
//! ambient tenant context.

mod error;
mod migrations;
pub mod models;
mod pool;

pub use error::DbError;
pub use migrations::run_migrations;
pub use pool::{DbPool, DbPoolOptions};
