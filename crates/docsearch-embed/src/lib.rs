//! Text embedding: a candle BERT encoder, a hashed fake for offline runs and
//! the shared [`ModelHandle`] that loads the model once per process.

mod bert;
mod device;
mod fake;
mod handle;
mod pool;
mod tokenize;

pub use bert::{resolve_model_dir, BertEmbedder};
pub use device::select_device;
pub use fake::FakeEmbedder;
pub use handle::ModelHandle;
pub use pool::masked_mean_l2;
pub use tokenize::tokenize_batch;

pub(crate) fn candle_err(e: candle_core::Error) -> docsearch_core::Error {
    docsearch_core::Error::Embedding(e.to_string())
}
