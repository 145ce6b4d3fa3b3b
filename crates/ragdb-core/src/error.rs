use thiserror::Error;

use crate::types::{ChunkId, DocumentId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown document: {0}")]
    UnknownDocument(DocumentId),

    #[error("Unknown chunk: {0}")]
    UnknownChunk(ChunkId),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index is empty")]
    EmptyIndex,

    /// `failed` holds the input positions of the texts that were not embedded.
    #[error("Embedding unavailable for {} text(s): {message}", failed.len())]
    EmbeddingUnavailable { failed: Vec<usize>, message: String },

    /// The document and its chunks are stored; `missing` lack vectors.
    #[error("Ingest incomplete for document {document_id}: {} chunk(s) lack vectors ({cause})", missing.len())]
    IngestIncomplete {
        document_id: DocumentId,
        missing: Vec<ChunkId>,
        cause: String,
    },

    #[error(
        "Deadline exceeded during {operation}{}",
        document_id.as_ref().map(|d| format!(" of document {d}")).unwrap_or_default()
    )]
    DeadlineExceeded {
        operation: &'static str,
        document_id: Option<DocumentId>,
    },

    #[error("Incompatible store version: found {found}, supported {supported}")]
    IncompatibleStoreVersion { found: u32, supported: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    /// All-or-nothing provider failure covering `count` inputs.
    pub fn embedding_unavailable(count: usize, cause: impl std::fmt::Display) -> Self {
        Self::EmbeddingUnavailable { failed: (0..count).collect(), message: cause.to_string() }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingUnavailable { .. } | Self::IngestIncomplete { .. } | Self::DeadlineExceeded { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
