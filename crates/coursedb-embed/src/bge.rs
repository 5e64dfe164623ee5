use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;

use coursedb_core::traits::Embedder;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_batch;

/// Token budget per input. A 1000-char chunk stays well inside it.
const MAX_TOKENS: usize = 512;

/// Local BGE-M3 dense embeddings on candle.
pub struct BgeM3Embedder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    id: String,
}

impl BgeM3Embedder {
    /// Load tokenizer, config and weights from `model_dir`, or from the
    /// first of `APP_MODEL_DIR`, `MODEL_DIR`, `../models/bge-m3`,
    /// `models/bge-m3` that exists.
    pub fn new(model_dir: Option<&Path>) -> Result<Self> {
        let device = select_device();
        let model_dir = resolve_model_dir(model_dir)?;
        tracing::info!("Loading BGE-M3 from {}", model_dir.display());

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e)
        })?;

        let config_path = model_dir.join("config.json");
        let raw_config = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config: XLMRobertaConfig = serde_json::from_str(&raw_config)?;
        let dim = serde_json::from_str::<serde_json::Value>(&raw_config)?
            .get("hidden_size")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))? as usize;

        let weights_path = model_dir.join("pytorch_model.bin");
        let weights = candle_core::pickle::read_all(&weights_path)
            .with_context(|| format!("Failed to read weights {}", weights_path.display()))?;
        let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        tracing::info!("BGE-M3 loaded (dim={})", dim);

        Ok(Self { model, tokenizer, device, dim, id: format!("bge-m3:d{dim}") })
    }
}

impl Embedder for BgeM3Embedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let (input_ids, attention_mask) =
            tokenize_batch(&self.tokenizer, texts, MAX_TOKENS, &self.device)?;
        let token_type_ids = Tensor::zeros((texts.len(), MAX_TOKENS), DType::I64, &self.device)?;
        let hidden =
            self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let vectors: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        tracing::debug!("Embedded {} texts in {:?}", texts.len(), start.elapsed());
        Ok(vectors)
    }
}

fn resolve_model_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        if dir.exists() {
            return Ok(dir.to_path_buf());
        }
        return Err(anyhow!("Model directory {} does not exist", dir.display()));
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() {
                tracing::debug!("Using {}: {}", var, p.display());
                return Ok(p);
            }
        }
    }
    for candidate in ["../models/bge-m3", "models/bge-m3"] {
        let p = Path::new(candidate);
        if p.exists() {
            return Ok(p.to_path_buf());
        }
    }
    Err(anyhow!("Could not locate BGE-M3 model directory"))
}
