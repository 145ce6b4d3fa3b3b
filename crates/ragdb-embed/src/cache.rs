//! Write-through embedding cache keyed by `(content_hash, embedder_id)`.
//!
//! The cache is consulted before calling the wrapped provider; only misses
//! are forwarded, in input order. Entries are bounded; once full, the oldest
//! insertion is evicted first.
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use ragdb_core::error::{Error, Result};
use ragdb_core::traits::Embedder;

pub fn hash_content(s: &str) -> String {
    blake3::hash(s.as_bytes()).to_hex().to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

type CacheKey = (String, String);

#[derive(Default)]
struct CacheState {
    map: HashMap<CacheKey, Vec<f32>>,
    order: VecDeque<CacheKey>,
}

impl CacheState {
    fn insert(&mut self, key: CacheKey, vector: Vec<f32>, capacity: usize) {
        if self.map.insert(key.clone(), vector).is_none() {
            self.order.push_back(key);
        }
        while self.map.len() > capacity {
            let Some(oldest) = self.order.pop_front() else { break };
            self.map.remove(&oldest);
        }
    }
}

pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    capacity: usize,
    entries: RwLock<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>) -> Self {
        Self::with_capacity(inner, DEFAULT_CACHE_CAPACITY)
    }

    /// At most `capacity` vectors are kept (minimum 1).
    pub fn with_capacity(inner: Arc<dyn Embedder>, capacity: usize) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            entries: RwLock::new(CacheState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize { self.capacity }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().map.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn key(&self, text: &str) -> CacheKey {
        (hash_content(text), self.inner.embedder_id().to_string())
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    fn embedder_id(&self) -> &str { self.inner.embedder_id() }
    fn dim(&self) -> usize { self.inner.dim() }
    fn supports_cancellation(&self) -> bool { self.inner.supports_cancellation() }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let keys: Vec<CacheKey> = texts.iter().map(|t| self.key(t)).collect();
        let mut vectors: Vec<Option<Vec<f32>>> = {
            let entries = self.entries.read();
            keys.iter().map(|k| entries.map.get(k).cloned()).collect()
        };
        let miss_indices: Vec<usize> = (0..texts.len()).filter(|&i| vectors[i].is_none()).collect();
        let hits = (texts.len() - miss_indices.len()) as u64;
        self.hits.fetch_add(hits, Ordering::Relaxed);
        self.misses.fetch_add(miss_indices.len() as u64, Ordering::Relaxed);
        debug!(hits, misses = miss_indices.len(), "embedding cache lookup");

        if !miss_indices.is_empty() {
            let miss_texts: Vec<String> = miss_indices.iter().map(|&i| texts[i].clone()).collect();
            let embs = self.inner.embed_batch(&miss_texts).await.map_err(|e| match e {
                Error::EmbeddingUnavailable { failed, message } => Error::EmbeddingUnavailable {
                    failed: failed.into_iter().filter_map(|j| miss_indices.get(j).copied()).collect(),
                    message,
                },
                other => other,
            })?;
            if embs.len() != miss_texts.len() {
                return Err(Error::EmbeddingUnavailable {
                    failed: miss_indices,
                    message: format!("provider returned {} vectors for {} texts", embs.len(), miss_texts.len()),
                });
            }
            let mut entries = self.entries.write();
            for (&i, v) in miss_indices.iter().zip(embs) {
                entries.insert(keys[i].clone(), v.clone(), self.capacity);
                vectors[i] = Some(v);
            }
        }
        Ok(vectors.into_iter().flatten().collect())
    }
}
