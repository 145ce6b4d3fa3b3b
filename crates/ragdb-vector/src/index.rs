use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use ragdb_core::error::{Error, Result};
use ragdb_core::types::{ChunkId, SearchHit};

use crate::math::l2_norm;
use crate::search::{ExactScan, SearchStrategy};

/// A stored vector and its back-reference into the corpus.
///
/// `seq` is the insertion sequence used to break score ties; an upsert keeps
/// the original `seq` of the chunk id.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk_id: ChunkId,
    pub vector: Vec<f32>,
    pub norm: f32,
    pub seq: u64,
}

#[derive(Default)]
pub(crate) struct IndexState {
    pub(crate) dim: Option<usize>,
    pub(crate) next_seq: u64,
    pub(crate) entries: Vec<IndexEntry>,
    pub(crate) positions: HashMap<ChunkId, usize>,
}

impl IndexState {
    pub(crate) fn upsert(&mut self, chunk_id: ChunkId, vector: Vec<f32>, norm: f32) {
        match self.positions.get(&chunk_id) {
            Some(&pos) => {
                let entry = &mut self.entries[pos];
                entry.vector = vector;
                entry.norm = norm;
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.positions.insert(chunk_id.clone(), self.entries.len());
                self.entries.push(IndexEntry { chunk_id, vector, norm, seq });
            }
        }
    }

    pub(crate) fn remove(&mut self, chunk_id: &str) -> bool {
        let Some(pos) = self.positions.remove(chunk_id) else { return false };
        self.entries.swap_remove(pos);
        if let Some(moved) = self.entries.get(pos) {
            self.positions.insert(moved.chunk_id.clone(), pos);
        }
        true
    }
}

/// Thread-safe vector index.
///
/// The first successful `add` fixes the dimension for the lifetime of the
/// instance. Writers hold the lock only to splice prepared entries in, so a
/// search never sees a partially written vector.
pub struct VectorIndex {
    pub(crate) state: RwLock<IndexState>,
    strategy: Box<dyn SearchStrategy>,
}

impl Default for VectorIndex {
    fn default() -> Self { Self::new() }
}

impl VectorIndex {
    pub fn new() -> Self { Self::with_strategy(Box::new(ExactScan)) }

    pub fn with_strategy(strategy: Box<dyn SearchStrategy>) -> Self {
        Self { state: RwLock::new(IndexState::default()), strategy }
    }

    pub(crate) fn from_state(state: IndexState, strategy: Box<dyn SearchStrategy>) -> Self {
        Self { state: RwLock::new(state), strategy }
    }

    pub fn strategy(&self) -> &dyn SearchStrategy { self.strategy.as_ref() }

    /// Insert or replace entries. All-or-nothing: one bad vector rejects the
    /// whole call.
    pub fn add(&self, entries: Vec<(ChunkId, Vec<f32>)>) -> Result<()> {
        if entries.is_empty() { return Ok(()); }
        let batch_dim = entries[0].1.len();
        let mut prepared = Vec::with_capacity(entries.len());
        for (chunk_id, vector) in entries {
            if vector.is_empty() {
                return Err(Error::InvalidArgument(format!("empty vector for chunk {chunk_id}")));
            }
            if vector.len() != batch_dim {
                return Err(Error::DimensionMismatch { expected: batch_dim, actual: vector.len() });
            }
            if vector.iter().any(|x| !x.is_finite()) {
                return Err(Error::InvalidArgument(format!("non-finite component in vector for chunk {chunk_id}")));
            }
            let norm = l2_norm(&vector);
            prepared.push((chunk_id, vector, norm));
        }

        let mut state = self.state.write();
        match state.dim {
            Some(dim) if dim != batch_dim => return Err(Error::DimensionMismatch { expected: dim, actual: batch_dim }),
            Some(_) => {}
            None => state.dim = Some(batch_dim),
        }
        let n = prepared.len();
        for (chunk_id, vector, norm) in prepared {
            state.upsert(chunk_id, vector, norm);
        }
        debug!(added = n, total = state.entries.len(), "vectors indexed");
        Ok(())
    }

    /// Top `k` entries by cosine similarity, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(Error::InvalidArgument("k must be positive".to_string()));
        }
        let state = self.state.read();
        if state.entries.is_empty() {
            return Err(Error::EmptyIndex);
        }
        if let Some(dim) = state.dim {
            if query.len() != dim {
                return Err(Error::DimensionMismatch { expected: dim, actual: query.len() });
            }
        }
        Ok(self.strategy.top_k(&state.entries, query, l2_norm(query), k))
    }

    /// No-op when absent.
    pub fn remove(&self, chunk_id: &str) -> bool {
        self.state.write().remove(chunk_id)
    }

    pub fn remove_many(&self, chunk_ids: &[ChunkId]) -> usize {
        let mut state = self.state.write();
        chunk_ids.iter().filter(|id| state.remove(id)).count()
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.state.read().positions.contains_key(chunk_id)
    }

    pub fn get(&self, chunk_id: &str) -> Option<Vec<f32>> {
        let state = self.state.read();
        state.positions.get(chunk_id).map(|&pos| state.entries[pos].vector.clone())
    }

    pub fn dim(&self) -> Option<usize> { self.state.read().dim }

    pub fn len(&self) -> usize { self.state.read().entries.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.id.as_str()).collect()
    }

    #[test]
    fn nearest_first_with_cosine_scores() {
        let index = VectorIndex::new();
        index
            .add(vec![
                ("a".into(), vec![1.0, 0.0]),
                ("b".into(), vec![0.0, 1.0]),
                ("c".into(), vec![0.9, 0.1]),
            ])
            .unwrap();
        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(ids(&hits), vec!["a", "c"]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!(hits[1].score < hits[0].score);
    }

    #[test]
    fn k_zero_and_empty_index_are_errors() {
        let index = VectorIndex::new();
        assert!(matches!(index.search(&[1.0], 0), Err(Error::InvalidArgument(_))));
        assert!(matches!(index.search(&[1.0], 3), Err(Error::EmptyIndex)));
    }

    #[test]
    fn first_add_fixes_dimension() {
        let index = VectorIndex::new();
        index.add(vec![("a".into(), vec![1.0, 0.0, 0.0])]).unwrap();
        assert_eq!(index.dim(), Some(3));
        assert!(matches!(
            index.add(vec![("b".into(), vec![1.0, 0.0])]),
            Err(Error::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(matches!(
            index.search(&[1.0, 0.0], 1),
            Err(Error::DimensionMismatch { expected: 3, actual: 2 })
        ));
        // The dimension outlives every entry.
        index.remove("a");
        index.add(vec![("c".into(), vec![0.0, 1.0])]).unwrap_err();
    }

    #[test]
    fn mixed_batch_is_rejected_whole() {
        let index = VectorIndex::new();
        let err = index.add(vec![("a".into(), vec![1.0, 0.0]), ("b".into(), vec![1.0])]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 1 }));
        assert!(index.is_empty());
        assert_eq!(index.dim(), None);
    }

    #[test]
    fn upsert_replaces_in_place_and_keeps_tie_order() {
        let index = VectorIndex::new();
        index.add(vec![("first".into(), vec![0.0, 1.0]), ("second".into(), vec![1.0, 0.0])]).unwrap();
        index.add(vec![("first".into(), vec![1.0, 0.0])]).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("first"), Some(vec![1.0, 0.0]));
        // Equal scores: the earlier-inserted id wins.
        let hits = index.search(&[1.0, 0.0], 5).unwrap();
        assert_eq!(ids(&hits), vec!["first", "second"]);
    }

    #[test]
    fn ties_follow_insertion_order() {
        let index = VectorIndex::new();
        for id in ["x", "y", "z"] {
            index.add(vec![(id.into(), vec![0.5, 0.5])]).unwrap();
        }
        let hits = index.search(&[1.0, 1.0], 2).unwrap();
        assert_eq!(ids(&hits), vec!["x", "y"]);
    }

    #[test]
    fn remove_is_idempotent_and_keeps_positions_consistent() {
        let index = VectorIndex::new();
        index
            .add(vec![("a".into(), vec![1.0, 0.0]), ("b".into(), vec![0.0, 1.0]), ("c".into(), vec![0.7, 0.7])])
            .unwrap();
        assert!(index.remove("a"));
        assert!(!index.remove("a"));
        assert!(!index.remove("missing"));
        assert_eq!(index.get("c"), Some(vec![0.7, 0.7]));
        let hits = index.search(&[0.0, 1.0], 5).unwrap();
        assert_eq!(ids(&hits), vec!["b", "c"]);
        assert_eq!(index.remove_many(&["b".to_string(), "zzz".to_string()]), 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn rejects_non_finite_and_empty_vectors() {
        let index = VectorIndex::new();
        assert!(matches!(index.add(vec![("a".into(), vec![f32::NAN])]), Err(Error::InvalidArgument(_))));
        assert!(matches!(index.add(vec![("a".into(), vec![])]), Err(Error::InvalidArgument(_))));
        assert!(index.is_empty());
    }
}
