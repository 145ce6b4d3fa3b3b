//! Embedding providers implementing `ragdb_core::traits::Embedder`.
//!
//! Respects `APP_USE_FAKE_EMBEDDINGS=1` to switch to the hashing embedder for
//! fast and deterministic outputs in tests and development.
use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::info;
use twox_hash::XxHash64;

use ragdb_core::config::{expand_path, EmbeddingProviderKind, EmbeddingSettings};
use ragdb_core::error::{Error, Result};
use ragdb_core::traits::Embedder;

pub mod cache;
pub mod device;
pub mod model;
pub mod pool;
pub mod tokenize;

pub use cache::CachedEmbedder;
pub use model::{EmbeddingModel, LocalEmbedder};
pub use pool::masked_mean_l2;

/// Feature-hashing bag of words: each lowercased alphanumeric term adds a
/// pseudo-random weight to one bucket, then the vector is L2-normalized.
/// Texts sharing terms land close together.
pub struct HashingEmbedder { dim: usize, id: String }

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, id: format!("hashing:d{dim}") }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let terms = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);
        for token in terms {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += 0.5 + val;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

fn fake_embeddings_forced() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Build the provider selected by `settings`, wrapped in the write-through
/// cache when enabled.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let inner: Arc<dyn Embedder> = if fake_embeddings_forced() || settings.provider == EmbeddingProviderKind::Hashing {
        info!(dim = settings.dim, "using hashing embedder");
        Arc::new(HashingEmbedder::new(settings.dim))
    } else {
        let configured = settings.model_dir.as_deref().map(expand_path);
        let dir = model::resolve_model_dir(configured.as_deref())
            .map_err(|e| Error::InvalidConfiguration(format!("{e:#}")))?;
        let local = LocalEmbedder::load(&dir).map_err(|e| Error::Operation(format!("loading local model: {e:#}")))?;
        Arc::new(local)
    };
    if settings.cache {
        Ok(Arc::new(CachedEmbedder::with_capacity(inner, settings.cache_capacity)))
    } else {
        Ok(inner)
    }
}
