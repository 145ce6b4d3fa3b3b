//! Hit-rate evaluation over `(query, expected)` cases.
use serde::{Deserialize, Serialize};
use tracing::info;

use ragdb_core::error::{Error, Result};

use crate::pipeline::{QueryOptions, RetrievalPipeline};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalCase {
    pub query: String,
    /// Text a relevant chunk must contain, compared case-insensitively.
    pub expected: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseOutcome {
    pub query: String,
    pub hit: bool,
    /// 1-based rank of the first matching chunk.
    pub rank: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalReport {
    pub cases: usize,
    pub hits: usize,
    pub hit_rate: f64,
    pub outcomes: Vec<CaseOutcome>,
}

pub async fn evaluate(pipeline: &RetrievalPipeline, cases: &[EvalCase], top_k: usize) -> Result<EvalReport> {
    if cases.is_empty() {
        return Err(Error::InvalidArgument("no evaluation cases".to_string()));
    }
    let options = QueryOptions::default();
    let mut outcomes = Vec::with_capacity(cases.len());
    for case in cases {
        let expected = case.expected.to_lowercase();
        let hits = pipeline.query(&case.query, top_k, &options).await?;
        let rank = hits.iter().position(|h| h.text.to_lowercase().contains(&expected)).map(|i| i + 1);
        outcomes.push(CaseOutcome { query: case.query.clone(), hit: rank.is_some(), rank });
    }
    let hits = outcomes.iter().filter(|o| o.hit).count();
    let hit_rate = hits as f64 / cases.len() as f64;
    info!(cases = cases.len(), hits, hit_rate, "evaluation finished");
    Ok(EvalReport { cases: cases.len(), hits, hit_rate, outcomes })
}
