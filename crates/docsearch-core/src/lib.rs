//! Domain model, collaborator traits and the pure building blocks shared by
//! the embedding, vector and pipeline crates.

pub mod chunker;
pub mod config;
pub mod error;
pub mod extract;
pub mod metadata;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
