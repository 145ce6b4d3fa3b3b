//! Retrieval pipeline: chunk, store, embed and index documents; embed,
//! search and hydrate queries.
//!
//! The pipeline is the only surface callers use. It composes a
//! `CorpusStore`, a `VectorIndex` and an injected `Embedder`; all state is
//! owned by the pipeline value, there are no process-wide registries.

pub mod evaluate;
pub mod locks;
pub mod pipeline;

pub use evaluate::{evaluate, CaseOutcome, EvalCase, EvalReport};
pub use pipeline::{DeleteReport, IngestOptions, PipelineStatus, QueryOptions, RetrievalPipeline};
