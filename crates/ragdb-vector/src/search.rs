use std::cmp::Ordering;

use ragdb_core::types::SearchHit;

use crate::index::IndexEntry;
use crate::math::cosine_with_norms;

/// Nearest-neighbour strategy run over the index's entries under its read lock.
///
/// Results must be ordered by descending score, ties by ascending `seq`.
/// Strategies that may miss true neighbours report `is_exact() == false`.
pub trait SearchStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn is_exact(&self) -> bool;
    fn top_k(&self, entries: &[IndexEntry], query: &[f32], query_norm: f32, k: usize) -> Vec<SearchHit>;
}

/// Linear scan scoring every entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactScan;

impl SearchStrategy for ExactScan {
    fn name(&self) -> &'static str { "exact-scan" }
    fn is_exact(&self) -> bool { true }

    fn top_k(&self, entries: &[IndexEntry], query: &[f32], query_norm: f32, k: usize) -> Vec<SearchHit> {
        let mut scored: Vec<(f32, u64, usize)> = entries
            .iter()
            .enumerate()
            .map(|(pos, e)| (cosine_with_norms(query, query_norm, &e.vector, e.norm), e.seq, pos))
            .collect();
        let by_rank = |a: &(f32, u64, usize), b: &(f32, u64, usize)| {
            b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal).then(a.1.cmp(&b.1))
        };
        if scored.len() > k {
            scored.select_nth_unstable_by(k - 1, by_rank);
            scored.truncate(k);
        }
        scored.sort_by(by_rank);
        scored
            .into_iter()
            .map(|(score, _, pos)| SearchHit { id: entries[pos].chunk_id.clone(), score })
            .collect()
    }
}
