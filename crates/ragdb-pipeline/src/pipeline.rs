use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use ragdb_core::chunker::{self, ChunkConfig};
use ragdb_core::error::{Error, Result};
use ragdb_core::traits::Embedder;
use ragdb_core::types::{ChunkId, DocumentId, Meta, QueryHit};
use ragdb_corpus::CorpusStore;
use ragdb_vector::VectorIndex;

use crate::locks::{DocGuard, DocLocks};

pub const CORPUS_FILE: &str = "corpus.json";
pub const INDEX_FILE: &str = "index.json";
const DEFAULT_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub chunking: ChunkConfig,
    /// Bound on the whole embed phase of one ingest or repair call.
    pub deadline: Option<Duration>,
}

impl IngestOptions {
    pub fn new(chunking: ChunkConfig) -> Self {
        Self { chunking, deadline: None }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub deadline: Option<Duration>,
}

impl QueryOptions {
    pub fn with_deadline(deadline: Duration) -> Self {
        Self { deadline: Some(deadline) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub document_id: DocumentId,
    pub chunks_removed: usize,
    pub vectors_removed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStatus {
    pub embedder_id: String,
    pub search_strategy: &'static str,
    pub exact_search: bool,
    pub documents: usize,
    pub chunks: usize,
    pub vectors: usize,
    pub dim: Option<usize>,
    /// Documents with at least one chunk lacking a vector.
    pub partial_documents: Vec<DocumentId>,
}

/// Composes chunker, corpus store, embedder and vector index.
///
/// Every operation takes `&self`; share the pipeline behind an `Arc` to run
/// ingests and queries concurrently. Only the embedder call suspends for
/// long, and it runs on its own task so an expired deadline returns promptly.
pub struct RetrievalPipeline {
    corpus: CorpusStore,
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    locks: DocLocks,
    batch_size: usize,
}

impl RetrievalPipeline {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_parts(CorpusStore::new(), VectorIndex::new(), embedder)
    }

    pub fn with_parts(corpus: CorpusStore, index: VectorIndex, embedder: Arc<dyn Embedder>) -> Self {
        Self { corpus, index, embedder, locks: DocLocks::new(), batch_size: DEFAULT_BATCH_SIZE }
    }

    /// Maximum number of texts per embedder call.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn corpus(&self) -> &CorpusStore { &self.corpus }

    pub fn index(&self) -> &VectorIndex { &self.index }

    pub fn embedder(&self) -> &Arc<dyn Embedder> { &self.embedder }

    /// Chunk, store, embed and index one document.
    ///
    /// Parameter errors are raised before anything is stored. Once the
    /// document is stored, an embedder or index failure leaves it partial
    /// and returns `IngestIncomplete` naming it; `repair` finishes the job.
    pub async fn ingest(&self, text: &str, metadata: Meta, options: &IngestOptions) -> Result<DocumentId> {
        options.chunking.validate()?;
        let normalized = chunker::normalize(text);
        if normalized.is_empty() {
            return Err(Error::InvalidArgument("document text is empty".to_string()));
        }
        let chunks = chunker::split(&normalized, &options.chunking)?;
        let deadline = options.deadline.map(|d| Instant::now() + d);

        let doc_id = self.corpus.put_document(normalized, metadata);
        let _guard = match self.lock_until(&doc_id, deadline, "ingest").await {
            Ok(guard) => guard,
            Err(_) => {
                // Nothing but the bare document exists yet; drop it.
                let _ = self.corpus.delete_document(&doc_id);
                return Err(Error::DeadlineExceeded { operation: "ingest", document_id: None });
            }
        };
        let chunk_ids = self.corpus.put_chunks(&doc_id, &chunks)?;
        let texts: Vec<String> = chunks.into_iter().map(|c| c.text).collect();

        self.embed_and_index(&doc_id, &chunk_ids, texts, deadline, "ingest").await?;
        info!(document_id = %doc_id, chunks = chunk_ids.len(), "document ingested");
        Ok(doc_id)
    }

    /// Re-embed only the chunks of `doc_id` that have no vector.
    /// Returns how many chunks were indexed.
    pub async fn repair(&self, doc_id: &str, options: &IngestOptions) -> Result<usize> {
        let deadline = options.deadline.map(|d| Instant::now() + d);
        let _guard = self.lock_until(doc_id, deadline, "repair").await?;
        let missing = self.pending_chunks(doc_id)?;
        if missing.is_empty() {
            return Ok(0);
        }
        let texts = missing
            .iter()
            .map(|id| self.corpus.chunk(id).map(|c| c.content.clone()))
            .collect::<Result<Vec<_>>>()?;
        self.embed_and_index(doc_id, &missing, texts, deadline, "repair").await?;
        info!(document_id = doc_id, repaired = missing.len(), "document repaired");
        Ok(missing.len())
    }

    /// Repair every partial document. All documents are attempted; the
    /// first failure is returned after the rest have been tried.
    pub async fn repair_all(&self, options: &IngestOptions) -> Result<usize> {
        let mut repaired = 0;
        let mut first_err = None;
        for doc_id in self.partial_documents() {
            match self.repair(&doc_id, options).await {
                Ok(n) => repaired += n,
                Err(Error::UnknownDocument(_)) => {}
                Err(e) => {
                    warn!(document_id = %doc_id, error = %e, "repair failed");
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(repaired),
        }
    }

    /// Embed the query, rank chunks and hydrate them with text and document
    /// metadata. An empty index yields an empty result. Hits whose chunk is
    /// no longer in the corpus are skipped and the result is refilled from
    /// lower-ranked hits.
    pub async fn query(&self, text: &str, top_k: usize, options: &QueryOptions) -> Result<Vec<QueryHit>> {
        if top_k == 0 {
            return Err(Error::InvalidArgument("top_k must be positive".to_string()));
        }
        if text.trim().is_empty() {
            return Err(Error::InvalidArgument("query text is empty".to_string()));
        }
        if self.index.is_empty() {
            debug!("query against empty index");
            return Ok(Vec::new());
        }
        let deadline = options.deadline.map(|d| Instant::now() + d);
        let query_vec = self
            .embed(vec![text.to_string()], deadline, "query", None)
            .await?
            .pop()
            .ok_or_else(|| Error::embedding_unavailable(1, "no vector returned for query"))?;

        let mut k = top_k;
        loop {
            let ranked = match self.index.search(&query_vec, k) {
                Ok(ranked) => ranked,
                Err(Error::EmptyIndex) => return Ok(Vec::new()),
                Err(e) => return Err(e),
            };
            let exhausted = ranked.len() < k;
            let mut hits = Vec::with_capacity(ranked.len().min(top_k));
            let mut stale = 0usize;
            for hit in ranked {
                let Some(h) = self.corpus.hydrate(&hit.id) else {
                    stale += 1;
                    continue;
                };
                hits.push(QueryHit {
                    chunk_id: hit.id,
                    document_id: h.chunk.doc_id.clone(),
                    ordinal: h.chunk.ordinal,
                    text: h.chunk.content.clone(),
                    score: hit.score,
                    document_metadata: h.metadata,
                });
                if hits.len() == top_k {
                    break;
                }
            }
            if stale > 0 {
                warn!(stale, k, "skipped index entries without corpus chunks");
            }
            if hits.len() == top_k || exhausted {
                debug!(hits = hits.len(), "query answered");
                return Ok(hits);
            }
            k = k.saturating_add(top_k - hits.len());
        }
    }

    /// Remove a document from the corpus, then its vectors from the index.
    pub async fn delete(&self, doc_id: &str) -> Result<DeleteReport> {
        let _guard = self.locks.lock(doc_id).await;
        let chunk_ids = self.corpus.delete_document(doc_id)?;
        let vectors_removed = self.index.remove_many(&chunk_ids);
        info!(document_id = doc_id, chunks = chunk_ids.len(), vectors = vectors_removed, "document deleted");
        Ok(DeleteReport { document_id: doc_id.to_string(), chunks_removed: chunk_ids.len(), vectors_removed })
    }

    /// Chunk ids of `doc_id` with no index entry, in ordinal order.
    pub fn pending_chunks(&self, doc_id: &str) -> Result<Vec<ChunkId>> {
        Ok(self.corpus.chunk_ids(doc_id)?.into_iter().filter(|id| !self.index.contains(id)).collect())
    }

    pub fn partial_documents(&self) -> Vec<DocumentId> {
        self.corpus
            .list_documents()
            .into_iter()
            .filter(|d| self.pending_chunks(&d.id).is_ok_and(|p| !p.is_empty()))
            .map(|d| d.id.clone())
            .collect()
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            embedder_id: self.embedder.embedder_id().to_string(),
            search_strategy: self.index.strategy().name(),
            exact_search: self.index.strategy().is_exact(),
            documents: self.corpus.document_count(),
            chunks: self.corpus.chunk_count(),
            vectors: self.index.len(),
            dim: self.index.dim(),
            partial_documents: self.partial_documents(),
        }
    }

    /// Write `corpus.json` then `index.json` under `dir`. Each file is a
    /// consistent snapshot; writes racing the save surface afterwards as
    /// partial documents (repairable) or stale entries (skipped by query).
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        self.corpus.save(&dir.join(CORPUS_FILE))?;
        self.index.save(&dir.join(INDEX_FILE))?;
        Ok(())
    }

    pub fn load(dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let corpus = CorpusStore::load(&dir.join(CORPUS_FILE))?;
        let index = VectorIndex::load(&dir.join(INDEX_FILE))?;
        if let Some(dim) = index.dim() {
            if dim != embedder.dim() {
                return Err(Error::DimensionMismatch { expected: dim, actual: embedder.dim() });
            }
        }
        Ok(Self::with_parts(corpus, index, embedder))
    }

    /// Load from `dir` when a saved state exists, otherwise start empty.
    pub fn open(dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        if dir.join(CORPUS_FILE).exists() || dir.join(INDEX_FILE).exists() {
            Self::load(dir, embedder)
        } else {
            info!(dir = %dir.display(), "no saved state, starting empty");
            Ok(Self::new(embedder))
        }
    }

    /// Wait for the document lock, giving up at `deadline`.
    async fn lock_until(&self, doc_id: &str, deadline: Option<Instant>, operation: &'static str) -> Result<DocGuard> {
        match deadline {
            None => Ok(self.locks.lock(doc_id).await),
            Some(at) => tokio::time::timeout_at(at, self.locks.lock(doc_id)).await.map_err(|_| {
                self.locks.prune(doc_id);
                warn!(operation, document_id = doc_id, "deadline exceeded waiting for document lock");
                Error::DeadlineExceeded { operation, document_id: Some(doc_id.to_string()) }
            }),
        }
    }

    async fn embed_and_index(
        &self,
        doc_id: &str,
        chunk_ids: &[ChunkId],
        texts: Vec<String>,
        deadline: Option<Instant>,
        operation: &'static str,
    ) -> Result<()> {
        for (ids, batch) in chunk_ids.chunks(self.batch_size).zip(texts.chunks(self.batch_size)) {
            let outcome = match self.embed(batch.to_vec(), deadline, operation, Some(doc_id)).await {
                Ok(vectors) => self.index.add(ids.iter().cloned().zip(vectors).collect()),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => {}
                Err(e @ Error::DeadlineExceeded { .. }) => return Err(e),
                Err(e) => {
                    let missing = chunk_ids.iter().filter(|id| !self.index.contains(id)).cloned().collect();
                    warn!(document_id = doc_id, error = %e, "embedding step failed, document left partial");
                    return Err(Error::IngestIncomplete { document_id: doc_id.to_string(), missing, cause: e.to_string() });
                }
            }
        }
        Ok(())
    }

    async fn embed(
        &self,
        texts: Vec<String>,
        deadline: Option<Instant>,
        operation: &'static str,
        doc_id: Option<&str>,
    ) -> Result<Vec<Vec<f32>>> {
        let n = texts.len();
        let embedder = Arc::clone(&self.embedder);
        let mut task = tokio::spawn(async move { embedder.embed_batch(&texts).await });
        let joined = match deadline {
            None => (&mut task).await,
            Some(at) => match tokio::time::timeout_at(at, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    if self.embedder.supports_cancellation() {
                        task.abort();
                    }
                    warn!(operation, document_id = doc_id.unwrap_or("-"), "deadline exceeded waiting for embedder");
                    return Err(Error::DeadlineExceeded { operation, document_id: doc_id.map(str::to_string) });
                }
            },
        };
        let vectors = joined.map_err(|e| Error::embedding_unavailable(n, format!("embedding task failed: {e}")))??;
        if vectors.len() != n {
            return Err(Error::embedding_unavailable(n, format!("provider returned {} vectors for {n} texts", vectors.len())));
        }
        Ok(vectors)
    }
}
