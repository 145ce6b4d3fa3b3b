//! BGE-M3 (XLM-RoBERTa) sentence embeddings through candle.
//!
//! Model files are read from a local directory: `tokenizer.json`,
//! `config.json` and either `model.safetensors` or `pytorch_model.bin`.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use ragdb_core::error::{Error, Result as CoreResult};
use ragdb_core::traits::Embedder;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_batch;

const MAX_LEN: usize = 256;

pub struct EmbeddingModel { model: XLMRobertaModel, tokenizer: Tokenizer, device: Device, dim: usize }

impl EmbeddingModel {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let device = select_device();
        info!(dir = %model_dir.display(), "loading BGE-M3 model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(
            &std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?,
        )?;
        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        info!("BGE-M3 model loaded");
        Ok(Self { model, tokenizer, device, dim: config.hidden_size })
    }

    pub fn dim(&self) -> usize { self.dim }

    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, texts, MAX_LEN, &self.device)?;
        let token_type_ids = Tensor::zeros((texts.len(), MAX_LEN), DType::I64, &self.device)?;
        let hidden_states = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden_states, &attention_mask)?;
        let out: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 * texts.len() as u128 { warn!(?elapsed, n = texts.len(), "slow embedding batch"); }
        debug!(?elapsed, n = texts.len(), "embedded batch");
        Ok(out)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    let weights = candle_core::pickle::read_all(&pickle).with_context(|| format!("reading {}", pickle.display()))?;
    Ok(weights.into_iter().collect())
}

/// Locate the model directory: explicit setting, `APP_MODEL_DIR`, `MODEL_DIR`,
/// then `../models/bge-m3` and `models/bge-m3`.
pub fn resolve_model_dir(configured: Option<&Path>) -> Result<PathBuf> {
    let candidates = configured
        .map(Path::to_path_buf)
        .into_iter()
        .chain(std::env::var("APP_MODEL_DIR").ok().map(PathBuf::from))
        .chain(std::env::var("MODEL_DIR").ok().map(PathBuf::from))
        .chain([PathBuf::from("../models/bge-m3"), PathBuf::from("models/bge-m3")]);
    for p in candidates {
        if p.exists() { info!(dir = %p.display(), "using model dir"); return Ok(p); }
    }
    Err(anyhow!("Could not locate BGE-M3 model directory"))
}

/// Async adapter running [`EmbeddingModel`] on the blocking pool.
pub struct LocalEmbedder { model: Arc<EmbeddingModel>, id: String }

impl LocalEmbedder {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let model = EmbeddingModel::load(model_dir)?;
        let id = format!("local:bge-m3:d{}", model.dim());
        Ok(Self { model: Arc::new(model), id })
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.model.dim() }
    // spawn_blocking work cannot be interrupted once started
    fn supports_cancellation(&self) -> bool { false }

    async fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let owned = texts.to_vec();
        let n = owned.len();
        tokio::task::spawn_blocking(move || model.embed_texts(&owned))
            .await
            .map_err(|e| Error::embedding_unavailable(n, e))?
            .map_err(|e| Error::embedding_unavailable(n, format!("{e:#}")))
    }
}
