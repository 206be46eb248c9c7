//! Storage backends.
//!
//! - [`MemoryStore`]: in-process, for tests and development
//! - [`PostgresStore`]: PostgreSQL via sqlx (`postgres` feature)

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
