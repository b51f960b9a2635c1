//! Database layer for the Parlance conversation backend.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations. Every table is created through versioned
//! migrations managed by this crate.
//!
//! The pool is created once at startup and handed to the server state
//! explicitly; nothing in the workspace reaches for a global connection.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
