//! Domain records shared by the corpus store, the vector index and the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type DocumentId = String;
pub type ChunkId = String;
pub type Meta = BTreeMap<String, String>;

/// An ingested unit of text.
///
/// - `id`: assigned by the corpus store at ingest, never reused
/// - `metadata`: free-form provenance (title, path, url, ...)
/// - `text`: the normalized text the chunks were cut from
/// - `ingested_at`: wall-clock time of `put_document`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub metadata: Meta,
    pub text: String,
    pub ingested_at: DateTime<Utc>,
}

/// A contiguous, token-bounded slice of a document.
///
/// `doc_id` is a back-reference; the store owns both records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub doc_id: DocumentId,
    pub ordinal: usize,
    pub content: String,
    pub token_count: usize,
}

/// Chunk text with its owning document and position, as returned by
/// `CorpusStore::get_chunk`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRef {
    pub text: String,
    pub doc_id: DocumentId,
    pub ordinal: usize,
}

/// Raw hit from the vector index. Higher `score` is always better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f32,
}

/// A hydrated query result carrying provenance back to its document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub ordinal: usize,
    pub text: String,
    pub score: f32,
    pub document_metadata: Meta,
}

/// Chunk identifiers are derived from the document id and ordinal; since
/// document ids are never reused, neither are chunk ids.
pub fn chunk_id(doc_id: &str, ordinal: usize) -> ChunkId {
    format!("{doc_id}:{ordinal}")
}
