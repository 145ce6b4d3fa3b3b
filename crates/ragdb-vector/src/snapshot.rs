//! Versioned save/restore of the vector index.
//!
//! Vectors are written as IEEE-754 bit patterns so a restore is bit-exact.
//! Entry insertion sequences are kept so tie-breaking survives a restart.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use ragdb_core::error::{Error, Result};
use ragdb_core::persist::{bits_to_f32s, f32s_to_bits, read_versioned, write_json_atomic};

use crate::index::{IndexEntry, IndexState, VectorIndex};
use crate::math::l2_norm;
use crate::search::{ExactScan, SearchStrategy};

pub const INDEX_SCHEMA_VERSION: u32 = 1;
pub const METRIC: &str = "cosine";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub schema_version: u32,
    pub metric: String,
    pub dim: Option<usize>,
    pub next_seq: u64,
    pub entries: Vec<EntryRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub chunk_id: String,
    pub seq: u64,
    pub bits: Vec<u32>,
}

impl VectorIndex {
    pub fn to_snapshot(&self) -> IndexSnapshot {
        let state = self.state.read();
        let mut entries: Vec<EntryRecord> = state
            .entries
            .iter()
            .map(|e| EntryRecord { chunk_id: e.chunk_id.clone(), seq: e.seq, bits: f32s_to_bits(&e.vector) })
            .collect();
        entries.sort_by_key(|e| e.seq);
        IndexSnapshot { schema_version: INDEX_SCHEMA_VERSION, metric: METRIC.to_string(), dim: state.dim, next_seq: state.next_seq, entries }
    }

    pub fn from_snapshot(snapshot: IndexSnapshot) -> Result<Self> {
        Self::from_snapshot_with_strategy(snapshot, Box::new(ExactScan))
    }

    pub fn from_snapshot_with_strategy(snapshot: IndexSnapshot, strategy: Box<dyn SearchStrategy>) -> Result<Self> {
        if snapshot.schema_version != INDEX_SCHEMA_VERSION {
            return Err(Error::IncompatibleStoreVersion { found: snapshot.schema_version, supported: INDEX_SCHEMA_VERSION });
        }
        if snapshot.metric != METRIC {
            return Err(Error::InvalidConfiguration(format!("snapshot metric '{}' is not '{METRIC}'", snapshot.metric)));
        }
        let mut entries = Vec::with_capacity(snapshot.entries.len());
        let mut positions = HashMap::with_capacity(snapshot.entries.len());
        for record in snapshot.entries {
            let vector = bits_to_f32s(&record.bits);
            if let Some(dim) = snapshot.dim {
                if vector.len() != dim {
                    return Err(Error::DimensionMismatch { expected: dim, actual: vector.len() });
                }
            }
            if record.seq >= snapshot.next_seq {
                return Err(Error::Operation(format!("entry {} has seq {} beyond counter {}", record.chunk_id, record.seq, snapshot.next_seq)));
            }
            if positions.insert(record.chunk_id.clone(), entries.len()).is_some() {
                return Err(Error::Operation(format!("duplicate entry for chunk {}", record.chunk_id)));
            }
            let norm = l2_norm(&vector);
            entries.push(IndexEntry { chunk_id: record.chunk_id, vector, norm, seq: record.seq });
        }
        let state = IndexState { dim: snapshot.dim, next_seq: snapshot.next_seq, entries, positions };
        Ok(Self::from_state(state, strategy))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = self.to_snapshot();
        write_json_atomic(path, &snapshot)?;
        info!(path = %path.display(), entries = snapshot.entries.len(), "index saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let snapshot: IndexSnapshot = read_versioned(path, INDEX_SCHEMA_VERSION)?;
        let index = Self::from_snapshot(snapshot)?;
        info!(path = %path.display(), entries = index.len(), "index loaded");
        Ok(index)
    }
}
