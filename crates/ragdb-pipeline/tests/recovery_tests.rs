use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ragdb_core::chunker::{ChunkConfig, TokenUnit};
use ragdb_core::error::{Error, Result};
use ragdb_core::traits::Embedder;
use ragdb_core::types::Meta;
use ragdb_embed::HashingEmbedder;
use ragdb_pipeline::{IngestOptions, QueryOptions, RetrievalPipeline};

/// Hashing embedder with switchable failure and latency.
struct ScriptedEmbedder {
    inner: HashingEmbedder,
    failing: AtomicBool,
    delay_ms: AtomicU64,
    cancellable: bool,
}

impl ScriptedEmbedder {
    fn new(cancellable: bool) -> Arc<Self> {
        Arc::new(Self {
            inner: HashingEmbedder::new(64),
            failing: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            cancellable,
        })
    }
}

#[async_trait]
impl Embedder for ScriptedEmbedder {
    fn embedder_id(&self) -> &str { "scripted" }
    fn dim(&self) -> usize { self.inner.dim() }
    fn supports_cancellation(&self) -> bool { self.cancellable }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::embedding_unavailable(texts.len(), "provider offline"));
        }
        self.inner.embed_batch(texts).await
    }
}

const TEXT: &str = "one two three four five six seven eight nine ten eleven twelve";

fn small_chunks() -> IngestOptions {
    IngestOptions::new(ChunkConfig::new(4, 0, TokenUnit::Word).unwrap())
}

#[tokio::test]
async fn failed_embedding_leaves_a_repairable_document() {
    let embedder = ScriptedEmbedder::new(true);
    let p = RetrievalPipeline::new(embedder.clone());
    embedder.failing.store(true, Ordering::SeqCst);

    let err = p.ingest(TEXT, Meta::new(), &small_chunks()).await.unwrap_err();
    let (document_id, missing) = match err {
        Error::IngestIncomplete { document_id, missing, .. } => (document_id, missing),
        other => panic!("expected IngestIncomplete, got {other:?}"),
    };
    assert_eq!(missing, vec![format!("{document_id}:0"), format!("{document_id}:1"), format!("{document_id}:2")]);
    assert_eq!(p.partial_documents(), vec![document_id.clone()]);
    assert_eq!(p.pending_chunks(&document_id).unwrap().len(), 3);
    assert!(p.corpus().get_document(&document_id).is_ok());

    embedder.failing.store(false, Ordering::SeqCst);
    assert_eq!(p.repair(&document_id, &small_chunks()).await.unwrap(), 3);
    assert!(p.partial_documents().is_empty());
    assert_eq!(p.repair(&document_id, &small_chunks()).await.unwrap(), 0);

    let hits = p.query("five six", 1, &QueryOptions::default()).await.unwrap();
    assert_eq!(hits[0].document_id, document_id);
}

#[tokio::test]
async fn failure_midway_keeps_earlier_batches() {
    /// Fails every call after the first.
    struct SecondCallFails { inner: HashingEmbedder, calls: AtomicU64 }

    #[async_trait]
    impl Embedder for SecondCallFails {
        fn embedder_id(&self) -> &str { "second-call-fails" }
        fn dim(&self) -> usize { self.inner.dim() }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(Error::embedding_unavailable(texts.len(), "quota"));
            }
            self.inner.embed_batch(texts).await
        }
    }

    let embedder = Arc::new(SecondCallFails { inner: HashingEmbedder::new(32), calls: AtomicU64::new(0) });
    let p = RetrievalPipeline::new(embedder).with_batch_size(2);

    let err = p.ingest(TEXT, Meta::new(), &small_chunks()).await.unwrap_err();
    match err {
        Error::IngestIncomplete { document_id, missing, cause } => {
            assert_eq!(missing, vec![format!("{document_id}:2")]);
            assert!(cause.contains("quota"));
            assert_eq!(p.index().len(), 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn repair_all_fixes_every_partial_document() {
    let embedder = ScriptedEmbedder::new(true);
    let p = RetrievalPipeline::new(embedder.clone());
    let healthy = p.ingest("already indexed", Meta::new(), &small_chunks()).await.unwrap();

    embedder.failing.store(true, Ordering::SeqCst);
    assert!(p.ingest(TEXT, Meta::new(), &small_chunks()).await.is_err());
    assert!(p.ingest("second broken doc", Meta::new(), &small_chunks()).await.is_err());
    assert_eq!(p.partial_documents().len(), 2);

    let err = p.repair_all(&small_chunks()).await.unwrap_err();
    assert!(err.is_retryable());

    embedder.failing.store(false, Ordering::SeqCst);
    assert_eq!(p.repair_all(&small_chunks()).await.unwrap(), 4);
    assert!(p.partial_documents().is_empty());
    assert!(!p.status().partial_documents.contains(&healthy));
}

#[tokio::test]
async fn ingest_deadline_returns_promptly() {
    for cancellable in [true, false] {
        let embedder = ScriptedEmbedder::new(cancellable);
        let p = RetrievalPipeline::new(embedder.clone());
        embedder.delay_ms.store(10_000, Ordering::SeqCst);

        let started = Instant::now();
        let opts = small_chunks().with_deadline(Duration::from_millis(50));
        let err = p.ingest(TEXT, Meta::new(), &opts).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2), "cancellable={cancellable}");

        let (operation, document_id) = match err {
            Error::DeadlineExceeded { operation, document_id } => (operation, document_id),
            other => panic!("expected DeadlineExceeded, got {other:?}"),
        };
        assert_eq!(operation, "ingest");
        let doc = document_id.expect("deadline after the document was stored names it");
        assert_eq!(p.pending_chunks(&doc).unwrap().len(), 3);
        assert!(p.index().is_empty());
    }
}

#[tokio::test]
async fn query_deadline_returns_promptly() {
    let embedder = ScriptedEmbedder::new(true);
    let p = RetrievalPipeline::new(embedder.clone());
    p.ingest(TEXT, Meta::new(), &small_chunks()).await.unwrap();

    embedder.delay_ms.store(10_000, Ordering::SeqCst);
    let started = Instant::now();
    let err = p
        .query("three", 2, &QueryOptions::with_deadline(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(matches!(err, Error::DeadlineExceeded { operation: "query", document_id: None }));
}

#[tokio::test]
async fn embedder_failure_on_query_is_reported() {
    let embedder = ScriptedEmbedder::new(true);
    let p = RetrievalPipeline::new(embedder.clone());
    p.ingest(TEXT, Meta::new(), &small_chunks()).await.unwrap();

    embedder.failing.store(true, Ordering::SeqCst);
    let err = p.query("three", 2, &QueryOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::EmbeddingUnavailable { ref failed, .. } if failed == &vec![0]));
}

/// Delays only texts containing `MARKER`; everything else embeds at once.
struct MarkerDelayEmbedder { inner: HashingEmbedder, delay: Duration }

const MARKER: &str = "slowpoke";

#[async_trait]
impl Embedder for MarkerDelayEmbedder {
    fn embedder_id(&self) -> &str { "marker-delay" }
    fn dim(&self) -> usize { self.inner.dim() }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains(MARKER)) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.embed_batch(texts).await
    }
}

fn marker_pipeline(delay: Duration) -> Arc<RetrievalPipeline> {
    Arc::new(RetrievalPipeline::new(Arc::new(MarkerDelayEmbedder { inner: HashingEmbedder::new(64), delay })))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_embedding_does_not_stall_other_requests() {
    let p = marker_pipeline(Duration::from_secs(2));
    p.ingest("quick note about apples", Meta::new(), &IngestOptions::default()).await.unwrap();

    let slow = {
        let p = Arc::clone(&p);
        tokio::spawn(async move {
            p.ingest(&format!("{MARKER} long report about pears"), Meta::new(), &IngestOptions::default()).await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    let hits = p.query("apples", 3, &QueryOptions::default()).await.unwrap();
    assert!(!hits.is_empty());
    p.ingest("another quick note about plums", Meta::new(), &IngestOptions::default()).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(!slow.is_finished(), "slow ingest is still embedding");

    slow.await.unwrap().unwrap();
    assert_eq!(p.status().documents, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repair_deadline_covers_waiting_for_the_document() {
    let p = marker_pipeline(Duration::from_secs(10));
    let slow = {
        let p = Arc::clone(&p);
        tokio::spawn(async move { p.ingest(MARKER, Meta::new(), &IngestOptions::default()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    let opts = IngestOptions::default().with_deadline(Duration::from_millis(50));
    let err = p.repair("doc-1", &opts).await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(matches!(
        err,
        Error::DeadlineExceeded { operation: "repair", document_id: Some(ref id) } if id == "doc-1"
    ));
    slow.abort();
}
