//! Storage implementations.
//!
//! - `MemoryStore` - In-memory storage for testing
//! - `SqliteStore` - SQLite-based storage (requires `sqlite` feature)

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
