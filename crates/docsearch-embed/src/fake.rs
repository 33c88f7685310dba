use std::hash::{Hash, Hasher};

use docsearch_core::traits::Embedder;
use docsearch_core::Result;
use twox_hash::XxHash64;

// Each token lands in this many buckets, so two different tokens almost
// never produce the same vector.
const SEEDS: u64 = 4;

/// Deterministic hashed bag-of-words embedder for tests and offline runs.
///
/// Identical texts map to identical unit vectors; texts sharing tokens are
/// closer than unrelated ones. No model files are needed.
pub struct FakeEmbedder {
    dim: usize,
    model_id: String,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, model_id: format!("fake:xxhash:d{dim}") }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            for seed in 0..SEEDS {
                let mut hasher = XxHash64::with_seed(seed);
                token.hash(&mut hasher);
                let h = hasher.finish();
                let idx = (h % self.dim as u64) as usize;
                let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
                let weight = 0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32;
                v[idx] += sign * weight;
            }
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }
    fn dim(&self) -> usize {
        self.dim
    }
    fn max_len(&self) -> usize {
        usize::MAX
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
