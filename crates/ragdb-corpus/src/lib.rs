//! Corpus store: documents and their chunk text, keyed by stable ids.
//!
//! The store never reaches into the vector index. `delete_document` returns
//! the chunk ids it removed so the caller can drop the matching vectors.

pub mod snapshot;
pub mod store;

pub use store::{CorpusStore, Hydrated};
