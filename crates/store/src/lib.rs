//! Datastore and document-search implementations for Lumi.
//!
//! Both backends implement every datastore trait from `lumi_core::store`
//! plus `SimilaritySource`, so one instance can back a whole deployment.

pub mod in_memory;
pub mod text;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::{InMemorySimilaritySource, InMemoryStore};
pub use text::chunk_text;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
