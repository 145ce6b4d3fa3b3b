//! Overlapping fixed-budget windows over a token sequence.
//!
//! Tokens are either whitespace-delimited words or Unicode scalar values.
//! Each chunk is the slice of the source text spanning its first to last
//! token, so chunks are always contiguous slices of the input.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUnit {
    #[default]
    Word,
    Char,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
    pub unit: TokenUnit,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self { max_tokens: 512, overlap_tokens: 50, unit: TokenUnit::Word }
    }
}

impl ChunkConfig {
    pub fn new(max_tokens: usize, overlap_tokens: usize, unit: TokenUnit) -> Result<Self> {
        let cfg = Self { max_tokens, overlap_tokens, unit };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(Error::InvalidConfiguration("max_tokens must be positive".to_string()));
        }
        if self.overlap_tokens >= self.max_tokens {
            return Err(Error::InvalidConfiguration(format!(
                "overlap_tokens ({}) must be smaller than max_tokens ({})",
                self.overlap_tokens, self.max_tokens
            )));
        }
        Ok(())
    }

    pub fn step(&self) -> usize {
        self.max_tokens - self.overlap_tokens
    }
}

/// One chunk produced by [`split`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkText {
    pub text: String,
    pub token_count: usize,
}

/// Collapse whitespace runs to a single space, trim, and drop NUL bytes.
pub fn normalize(text: &str) -> String {
    text.replace('\0', "").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Byte spans of the tokens of `text` under `unit`, in order.
pub fn token_spans(text: &str, unit: TokenUnit) -> Vec<Range<usize>> {
    match unit {
        TokenUnit::Char => text.char_indices().map(|(i, c)| i..i + c.len_utf8()).collect(),
        TokenUnit::Word => {
            let mut spans = Vec::new();
            let mut start = None;
            for (i, c) in text.char_indices() {
                match (c.is_whitespace(), start) {
                    (true, Some(s)) => {
                        spans.push(s..i);
                        start = None;
                    }
                    (false, None) => start = Some(i),
                    _ => {}
                }
            }
            if let Some(s) = start {
                spans.push(s..text.len());
            }
            spans
        }
    }
}

pub fn count_tokens(text: &str, unit: TokenUnit) -> usize {
    match unit {
        TokenUnit::Char => text.chars().count(),
        TokenUnit::Word => text.split_whitespace().count(),
    }
}

/// Token-index windows for a sequence of `n_tokens` units.
///
/// Windows start at `0, step, 2*step, ...` and span up to `max_tokens`
/// units; the last window ends exactly at `n_tokens`.
pub fn windows(n_tokens: usize, cfg: &ChunkConfig) -> Result<Vec<Range<usize>>> {
    cfg.validate()?;
    let mut out = Vec::new();
    if n_tokens == 0 {
        return Ok(out);
    }
    let step = cfg.step();
    let mut start = 0usize;
    loop {
        let end = (start + cfg.max_tokens).min(n_tokens);
        out.push(start..end);
        if end >= n_tokens {
            break;
        }
        start += step;
    }
    Ok(out)
}

/// Split `text` into overlapping chunks.
///
/// Word chunks are the window's words joined by single spaces; char chunks
/// are exact substrings. Pure and deterministic. Text without any token
/// yields no chunks.
pub fn split(text: &str, cfg: &ChunkConfig) -> Result<Vec<ChunkText>> {
    let spans = token_spans(text, cfg.unit);
    let ranges = windows(spans.len(), cfg)?;
    Ok(ranges
        .into_iter()
        .map(|w| {
            let text = match cfg.unit {
                TokenUnit::Word => spans[w.clone()].iter().map(|r| &text[r.clone()]).collect::<Vec<_>>().join(" "),
                TokenUnit::Char => text[spans[w.start].start..spans[w.end - 1].end].to_string(),
            };
            ChunkText { text, token_count: w.len() }
        })
        .collect())
}
