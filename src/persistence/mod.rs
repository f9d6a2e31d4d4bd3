//! Persistence layer: repository traits and the SQLite implementation.

pub mod error;
pub mod sqlite;
pub mod traits;
