//! Record storage for calcgraph.
//!
//! The engine reaches nodes and entities only through the traits in
//! [`traits`]; this crate provides two interchangeable backends.
//!
//! # Modules
//!
//! - [`traits`]: `RecordReader`, `Transaction`, `RecordStore`
//! - [`field`]: declared field kinds and record validation
//! - [`memory`]: `InMemoryStore`
//! - [`sqlite`]: `SqliteStore`
//! - [`schema`]: SQLite migrations and connection setup
//! - [`error`]: StorageError

pub mod error;
pub mod field;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use error::StorageError;
pub use field::{FieldKind, FieldValue};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{Edge, RecordReader, RecordStore, Transaction};
