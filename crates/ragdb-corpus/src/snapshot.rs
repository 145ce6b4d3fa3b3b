//! Versioned save/restore of the corpus store.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use ragdb_core::error::{Error, Result};
use ragdb_core::persist::{read_versioned, write_json_atomic};
use ragdb_core::types::{Chunk, Document, Meta};

use crate::store::{CorpusState, CorpusStore, DocumentRecord};

pub const CORPUS_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusSnapshot {
    pub schema_version: u32,
    pub next_seq: u64,
    pub documents: Vec<DocumentEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub seq: u64,
    pub id: String,
    pub metadata: Meta,
    pub text: String,
    pub ingested_at: DateTime<Utc>,
    pub chunks: Vec<ChunkEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub id: String,
    pub content: String,
    pub token_count: usize,
}

impl CorpusStore {
    pub fn to_snapshot(&self) -> CorpusSnapshot {
        let state = self.state.read();
        let mut documents: Vec<DocumentEntry> = state
            .documents
            .values()
            .map(|r| DocumentEntry {
                seq: r.seq,
                id: r.document.id.clone(),
                metadata: r.document.metadata.clone(),
                text: r.document.text.clone(),
                ingested_at: r.document.ingested_at,
                chunks: r
                    .chunk_ids
                    .iter()
                    .filter_map(|id| state.chunks.get(id))
                    .map(|c| ChunkEntry { id: c.id.clone(), content: c.content.clone(), token_count: c.token_count })
                    .collect(),
            })
            .collect();
        documents.sort_by_key(|d| d.seq);
        CorpusSnapshot { schema_version: CORPUS_SCHEMA_VERSION, next_seq: state.next_seq, documents }
    }

    pub fn from_snapshot(snapshot: CorpusSnapshot) -> Result<Self> {
        if snapshot.schema_version != CORPUS_SCHEMA_VERSION {
            return Err(Error::IncompatibleStoreVersion { found: snapshot.schema_version, supported: CORPUS_SCHEMA_VERSION });
        }
        let mut state = CorpusState { next_seq: snapshot.next_seq, ..CorpusState::default() };
        for entry in snapshot.documents {
            if entry.seq > state.next_seq {
                return Err(Error::Operation(format!("document {} has seq {} beyond counter {}", entry.id, entry.seq, state.next_seq)));
            }
            let mut chunk_ids = Vec::with_capacity(entry.chunks.len());
            for (ordinal, c) in entry.chunks.into_iter().enumerate() {
                chunk_ids.push(c.id.clone());
                let chunk = Chunk { id: c.id.clone(), doc_id: entry.id.clone(), ordinal, content: c.content, token_count: c.token_count };
                state.chunks.insert(c.id, Arc::new(chunk));
            }
            let document = Document { id: entry.id.clone(), metadata: entry.metadata, text: entry.text, ingested_at: entry.ingested_at };
            state.documents.insert(entry.id, DocumentRecord { seq: entry.seq, document: Arc::new(document), chunk_ids });
        }
        Ok(Self { state: parking_lot::RwLock::new(state) })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = self.to_snapshot();
        write_json_atomic(path, &snapshot)?;
        info!(path = %path.display(), documents = snapshot.documents.len(), "corpus saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let snapshot: CorpusSnapshot = read_versioned(path, CORPUS_SCHEMA_VERSION)?;
        let store = Self::from_snapshot(snapshot)?;
        info!(path = %path.display(), documents = store.document_count(), chunks = store.chunk_count(), "corpus loaded");
        Ok(store)
    }
}
