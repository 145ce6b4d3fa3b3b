use async_trait::async_trait;

use crate::error::Result;

/// Batch text-to-vector capability injected into the pipeline.
///
/// Implementations may be local or remote, may batch internally and may be
/// slow. A call is all-or-nothing: on failure return
/// `Error::EmbeddingUnavailable` naming the input positions that failed.
/// The returned vectors must match the input in length and order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `hashing:d384`).
    fn embedder_id(&self) -> &str;

    /// Embedding dimensionality.
    fn dim(&self) -> usize;

    /// Whether dropping an in-flight `embed_batch` future stops the work.
    /// When false, the pipeline lets an expired call finish in the
    /// background and discards the result.
    fn supports_cancellation(&self) -> bool {
        true
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
