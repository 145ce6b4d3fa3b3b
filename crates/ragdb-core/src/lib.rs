//! Shared building blocks for the retrieval workspace: identifiers and
//! records, the error enum every crate returns, the embedding capability,
//! configuration, the chunker and the directory loader.

pub mod chunker;
pub mod config;
pub mod data_processor;
pub mod error;
pub mod logging;
pub mod persist;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
