//! Fixed-length, overlapping character windows.
//!
//! Boundaries are char offsets; no attempt is made to respect words or
//! sentences. A text no longer than `chunk_size` is returned whole.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Chunk;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_OVERLAP: usize = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE, overlap: DEFAULT_OVERLAP }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be > 0".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Default for Chunker {
    fn default() -> Self {
        Self { config: ChunkingConfig::default() }
    }
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    pub fn split(&self, text: &str) -> Vec<Chunk> {
        windows(text, self.config.chunk_size, self.config.overlap)
    }
}

/// Split `text` into chunk strings.
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    Ok(split_chunks(text, chunk_size, overlap)?.into_iter().map(|c| c.text).collect())
}

/// Split `text` into chunks carrying their position and char offsets.
pub fn split_chunks(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    ChunkingConfig { chunk_size, overlap }.validate()?;
    Ok(windows(text, chunk_size, overlap))
}

// Caller guarantees overlap < chunk_size.
fn windows(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    // Byte offset of every char boundary, plus the end of the string.
    let bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
    let len = bounds.len() - 1;
    if len <= chunk_size {
        return vec![Chunk { position: 0, start: 0, end: len, text: text.to_string() }];
    }
    let step = chunk_size - overlap;
    let mut chunks = Vec::with_capacity(len.div_ceil(step));
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(len);
        chunks.push(Chunk {
            position: chunks.len(),
            start,
            end,
            text: text[bounds[start]..bounds[end]].to_string(),
        });
        if end == len {
            break;
        }
        start += step;
    }
    chunks
}
