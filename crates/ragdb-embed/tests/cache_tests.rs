use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ragdb_core::error::{Error, Result};
use ragdb_core::traits::Embedder;
use ragdb_embed::{CachedEmbedder, HashingEmbedder};

/// Counts how many texts reach the provider; fails any text containing "boom".
struct CountingEmbedder { inner: HashingEmbedder, seen: AtomicUsize }

#[async_trait]
impl Embedder for CountingEmbedder {
    fn embedder_id(&self) -> &str { self.inner.embedder_id() }
    fn dim(&self) -> usize { self.inner.dim() }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.seen.fetch_add(texts.len(), Ordering::SeqCst);
        let failed: Vec<usize> = texts.iter().enumerate().filter(|(_, t)| t.contains("boom")).map(|(i, _)| i).collect();
        if !failed.is_empty() {
            return Err(Error::EmbeddingUnavailable { failed, message: "boom".into() });
        }
        self.inner.embed_batch(texts).await
    }
}

fn counting() -> Arc<CountingEmbedder> {
    Arc::new(CountingEmbedder { inner: HashingEmbedder::new(32), seen: AtomicUsize::new(0) })
}

#[tokio::test]
async fn only_misses_reach_the_provider() {
    let provider = counting();
    let cached = CachedEmbedder::new(provider.clone());

    let first = cached.embed_batch(&["alpha".to_string(), "beta".to_string()]).await.unwrap();
    assert_eq!(provider.seen.load(Ordering::SeqCst), 2);

    let second = cached
        .embed_batch(&["beta".to_string(), "gamma".to_string(), "alpha".to_string()])
        .await
        .unwrap();
    assert_eq!(provider.seen.load(Ordering::SeqCst), 3, "only gamma was new");
    assert_eq!(second[0], first[1]);
    assert_eq!(second[2], first[0]);

    let stats = cached.stats();
    assert_eq!(stats.entries, 3);
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 3);
}

#[tokio::test]
async fn entries_stay_within_capacity() {
    let provider = counting();
    let cached = CachedEmbedder::with_capacity(provider.clone(), 3);

    for i in 0..10 {
        cached.embed_batch(&[format!("text {i}"), format!("other {i}")]).await.unwrap();
        assert!(cached.stats().entries <= 3);
    }
    assert_eq!(cached.stats().entries, 3);

    // Oldest insertions were evicted; the newest are still served from cache.
    let seen = provider.seen.load(Ordering::SeqCst);
    cached.embed_batch(&["other 9".to_string()]).await.unwrap();
    assert_eq!(provider.seen.load(Ordering::SeqCst), seen);
    cached.embed_batch(&["text 0".to_string()]).await.unwrap();
    assert_eq!(provider.seen.load(Ordering::SeqCst), seen + 1);
    assert_eq!(cached.stats().entries, 3);
}

#[tokio::test]
async fn failures_are_reported_at_caller_positions() {
    let provider = counting();
    let cached = CachedEmbedder::new(provider);
    cached.embed_batch(&["warm".to_string()]).await.unwrap();

    let err = cached
        .embed_batch(&["warm".to_string(), "fine".to_string(), "boom here".to_string()])
        .await
        .unwrap_err();
    match err {
        Error::EmbeddingUnavailable { failed, .. } => assert_eq!(failed, vec![2]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(cached.stats().entries, 1, "nothing cached from a failed call");
}
