use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use docsearch_core::traits::Embedder;
use docsearch_core::{Error, Result};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use crate::candle_err;
use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_batch;

/// Sentence-transformer style BERT encoder (all-MiniLM-L6-v2 by default)
/// loaded from a local model directory.
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    dim: usize,
    max_len: usize,
    pad_id: u32,
}

impl BertEmbedder {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let load_err = |what: &str, e: &dyn std::fmt::Display| {
            Error::Embedding(format!("failed to load {what} from {}: {e}", model_dir.display()))
        };
        let device = select_device();
        info!(model_dir = %model_dir.display(), "loading embedding model");

        let tokenizer = Tokenizer::from_file(model_dir.join("tokenizer.json")).map_err(|e| load_err("tokenizer", &e))?;
        let config_str = std::fs::read_to_string(model_dir.join("config.json")).map_err(|e| load_err("config", &e))?;
        let config: BertConfig = serde_json::from_str(&config_str).map_err(|e| load_err("config", &e))?;

        let safetensors = model_dir.join("model.safetensors");
        let weights: HashMap<String, Tensor> = if safetensors.exists() {
            debug!("reading safetensors weights");
            candle_core::safetensors::load(&safetensors, &device).map_err(|e| load_err("weights", &e))?
        } else {
            debug!("reading pytorch weights");
            candle_core::pickle::read_all(model_dir.join("pytorch_model.bin"))
                .map_err(|e| load_err("weights", &e))?
                .into_iter()
                .collect()
        };
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config).map_err(|e| load_err("model", &e))?;

        let pad_id = tokenizer.token_to_id("[PAD]").unwrap_or(0);
        let name = model_dir.file_name().map_or_else(|| "bert".to_string(), |n| n.to_string_lossy().to_string());
        let dim = config.hidden_size;
        let max_len = max_len.min(config.max_position_embeddings);
        info!(model = %name, dim, max_len, "embedding model loaded");
        Ok(Self { model, tokenizer, device, model_id: format!("bert:{name}:d{dim}"), dim, max_len, pad_id })
    }

    fn forward(&self, texts: &[String]) -> candle_core::Result<Vec<Vec<f32>>> {
        let (input_ids, attention_mask) =
            tokenize_batch(&self.tokenizer, texts, self.max_len, self.pad_id, &self.device)
            .map_err(|e| candle_core::Error::Msg(e.to_string()))?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2::<f32>()
    }
}

impl Embedder for BertEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }
    fn dim(&self) -> usize {
        self.dim
    }
    fn max_len(&self) -> usize {
        self.max_len
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let vectors = self.forward(texts).map_err(candle_err)?;
        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 * texts.len() as u128 {
            warn!(batch = texts.len(), elapsed_ms = elapsed.as_millis() as u64, "slow embedding batch");
        }
        Ok(vectors)
    }
}

/// Locate the model directory: `APP_MODEL_DIR`, then `MODEL_DIR`, then the
/// configured path.
pub fn resolve_model_dir(configured: &str) -> Result<PathBuf> {
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() {
                info!(var, dir = %p.display(), "using model dir from env");
                return Ok(p);
            }
        }
    }
    let p = docsearch_core::config::expand_path(configured);
    if p.exists() {
        return Ok(p);
    }
    Err(Error::Embedding(format!("could not locate embedding model directory '{configured}'")))
}
