//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_CHUNKING__MAX_TOKENS`).
//! Provides a helper to expand `~` and `${VAR}` in configured paths.
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::chunker::ChunkConfig;
use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfiguration(format!("Failed to get '{key}': {e}")))
    }

    /// Typed view of the whole configuration, validated.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfiguration(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunking: ChunkConfig,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub storage: StorageSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.embedding.dim == 0 {
            return Err(Error::InvalidConfiguration("embedding.dim must be positive".to_string()));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::InvalidConfiguration("embedding.batch_size must be positive".to_string()));
        }
        if self.embedding.cache && self.embedding.cache_capacity == 0 {
            return Err(Error::InvalidConfiguration("embedding.cache_capacity must be positive".to_string()));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::InvalidConfiguration("retrieval.top_k must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    #[default]
    Hashing,
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderKind,
    pub dim: usize,
    pub model_dir: Option<String>,
    pub batch_size: usize,
    pub cache: bool,
    /// Maximum number of cached vectors.
    pub cache_capacity: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { provider: EmbeddingProviderKind::Hashing, dim: 384, model_dir: None, batch_size: 32, cache: true, cache_capacity: 10_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub deadline_ms: Option<u64>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 5, deadline_ms: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { dir: "./data/ragdb".to_string() }
    }
}

impl StorageSettings {
    pub fn resolved_dir(&self) -> PathBuf {
        expand_path(&self.dir)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::TokenUnit;

    fn from_toml(src: &str) -> Config {
        Config::from_figment(Figment::new().merge(Toml::string(src)))
    }

    #[test]
    fn defaults_apply_when_sections_missing() {
        let settings = from_toml("").settings().unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.chunking.max_tokens, 512);
        assert_eq!(settings.retrieval.top_k, 5);
    }

    #[test]
    fn nested_sections_are_extracted() {
        let cfg = from_toml(
            r#"
            [chunking]
            max_tokens = 64
            overlap_tokens = 8
            unit = "char"

            [embedding]
            provider = "local"
            model_dir = "/models/bge-m3"

            [retrieval]
            deadline_ms = 1500
            "#,
        );
        let settings = cfg.settings().unwrap();
        assert_eq!(settings.chunking, ChunkConfig { max_tokens: 64, overlap_tokens: 8, unit: TokenUnit::Char });
        assert_eq!(settings.embedding.provider, EmbeddingProviderKind::Local);
        assert_eq!(settings.embedding.batch_size, 32);
        assert_eq!(settings.retrieval.deadline_ms, Some(1500));
        let top_k: usize = cfg.get("retrieval.top_k").unwrap_or(5);
        assert_eq!(top_k, 5);
    }

    #[test]
    fn invalid_chunking_is_rejected() {
        let cfg = from_toml("[chunking]\nmax_tokens = 4\noverlap_tokens = 4\n");
        assert!(matches!(cfg.settings(), Err(Error::InvalidConfiguration(_))));
    }
}
