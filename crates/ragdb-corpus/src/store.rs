use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use ragdb_core::chunker::ChunkText;
use ragdb_core::error::{Error, Result};
use ragdb_core::types::{chunk_id, Chunk, ChunkId, ChunkRef, Document, DocumentId, Meta};

pub(crate) struct DocumentRecord {
    pub(crate) seq: u64,
    pub(crate) document: Arc<Document>,
    pub(crate) chunk_ids: Vec<ChunkId>,
}

#[derive(Default)]
pub(crate) struct CorpusState {
    pub(crate) next_seq: u64,
    pub(crate) documents: HashMap<DocumentId, DocumentRecord>,
    pub(crate) chunks: HashMap<ChunkId, Arc<Chunk>>,
}

/// A chunk together with its owning document's metadata, read under one lock.
#[derive(Debug, Clone)]
pub struct Hydrated {
    pub chunk: Arc<Chunk>,
    pub metadata: Meta,
}

/// Thread-safe document/chunk store. Readers never observe a document
/// without its metadata or a chunk without its text.
#[derive(Default)]
pub struct CorpusStore {
    pub(crate) state: RwLock<CorpusState>,
}

impl CorpusStore {
    pub fn new() -> Self { Self::default() }

    /// Store a document under a fresh id. Ids are never reused, even after
    /// the document is deleted.
    pub fn put_document(&self, text: impl Into<String>, metadata: Meta) -> DocumentId {
        let mut state = self.state.write();
        state.next_seq += 1;
        let seq = state.next_seq;
        let id = format!("doc-{seq}");
        let document = Document { id: id.clone(), metadata, text: text.into(), ingested_at: Utc::now() };
        state.documents.insert(id.clone(), DocumentRecord { seq, document: Arc::new(document), chunk_ids: Vec::new() });
        debug!(document_id = %id, "document stored");
        id
    }

    /// Attach the ordered chunks of a document. Chunks are immutable, so a
    /// document accepts exactly one call.
    pub fn put_chunks(&self, doc_id: &str, chunks: &[ChunkText]) -> Result<Vec<ChunkId>> {
        let records: Vec<Arc<Chunk>> = chunks
            .iter()
            .enumerate()
            .map(|(ordinal, c)| {
                Arc::new(Chunk {
                    id: chunk_id(doc_id, ordinal),
                    doc_id: doc_id.to_string(),
                    ordinal,
                    content: c.text.clone(),
                    token_count: c.token_count,
                })
            })
            .collect();
        let ids: Vec<ChunkId> = records.iter().map(|c| c.id.clone()).collect();

        let mut state = self.state.write();
        let record = state.documents.get_mut(doc_id).ok_or_else(|| Error::UnknownDocument(doc_id.to_string()))?;
        if !record.chunk_ids.is_empty() {
            return Err(Error::InvalidArgument(format!("document {doc_id} already has chunks")));
        }
        record.chunk_ids = ids.clone();
        for chunk in records {
            state.chunks.insert(chunk.id.clone(), chunk);
        }
        debug!(document_id = doc_id, chunks = ids.len(), "chunks stored");
        Ok(ids)
    }

    pub fn get_chunk(&self, chunk_id: &str) -> Result<ChunkRef> {
        let chunk = self.chunk(chunk_id)?;
        Ok(ChunkRef { text: chunk.content.clone(), doc_id: chunk.doc_id.clone(), ordinal: chunk.ordinal })
    }

    pub fn chunk(&self, chunk_id: &str) -> Result<Arc<Chunk>> {
        self.state.read().chunks.get(chunk_id).cloned().ok_or_else(|| Error::UnknownChunk(chunk_id.to_string()))
    }

    /// Chunk plus owning document metadata, or `None` when either is gone.
    pub fn hydrate(&self, chunk_id: &str) -> Option<Hydrated> {
        let state = self.state.read();
        let chunk = state.chunks.get(chunk_id)?;
        let record = state.documents.get(&chunk.doc_id)?;
        Some(Hydrated { chunk: Arc::clone(chunk), metadata: record.document.metadata.clone() })
    }

    pub fn get_document(&self, doc_id: &str) -> Result<Arc<Document>> {
        self.state
            .read()
            .documents
            .get(doc_id)
            .map(|r| Arc::clone(&r.document))
            .ok_or_else(|| Error::UnknownDocument(doc_id.to_string()))
    }

    /// Chunk ids of a document in ordinal order.
    pub fn chunk_ids(&self, doc_id: &str) -> Result<Vec<ChunkId>> {
        self.state
            .read()
            .documents
            .get(doc_id)
            .map(|r| r.chunk_ids.clone())
            .ok_or_else(|| Error::UnknownDocument(doc_id.to_string()))
    }

    /// Documents in ingest order.
    pub fn list_documents(&self) -> Vec<Arc<Document>> {
        let state = self.state.read();
        let mut records: Vec<&DocumentRecord> = state.documents.values().collect();
        records.sort_by_key(|r| r.seq);
        records.into_iter().map(|r| Arc::clone(&r.document)).collect()
    }

    /// Remove a document and cascade to its chunks. Returns the removed
    /// chunk ids in ordinal order.
    pub fn delete_document(&self, doc_id: &str) -> Result<Vec<ChunkId>> {
        let mut state = self.state.write();
        let record = state.documents.remove(doc_id).ok_or_else(|| Error::UnknownDocument(doc_id.to_string()))?;
        for id in &record.chunk_ids {
            state.chunks.remove(id);
        }
        debug!(document_id = doc_id, chunks = record.chunk_ids.len(), "document deleted");
        Ok(record.chunk_ids)
    }

    pub fn document_count(&self) -> usize {
        self.state.read().documents.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.state.read().chunks.len()
    }
}
