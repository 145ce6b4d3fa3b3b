//! In-memory vector index with a pluggable nearest-neighbour strategy.
//!
//! Entries pair a chunk id with its embedding; the index never stores
//! chunk text. Similarity is cosine, higher is better.

pub mod index;
pub mod math;
pub mod search;
pub mod snapshot;

pub use index::{IndexEntry, VectorIndex};
pub use search::{ExactScan, SearchStrategy};
