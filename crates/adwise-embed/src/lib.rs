//! Text embeddings for adwise.
//!
//! Turns arbitrary text into fixed-dimension, L2-normalised vectors so that
//! cosine similarity reduces to a dot product.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  EmbeddingProvider                           │
//! │  - embed(text, model_id) -> Vec<f32>         │
//! │  - model_id -> SharedEmbedder cache          │
//! └──────────────────────────────────────────────┘
//!                    │ first use of a model
//!                    ▼
//! ┌──────────────────────────────────────────────┐
//! │  ModelLoader (SpecLoader from EmbedderSpec)  │
//! └──────────────────────────────────────────────┘
//!                    │
//!     ┌──────────────┼──────────────┐
//!     ▼              ▼              ▼
//! ┌────────┐   ┌──────────┐   ┌────────────┐
//! │  Hash  │   │  OpenAI  │   │ Local ONNX │
//! └────────┘   └──────────┘   └────────────┘
//! ```

pub mod embeddings;
pub mod error;
pub mod provider;

pub use embeddings::{
    Embedder, HashEmbedder, OpenAiEmbedder, OpenAiEmbedderConfig, SharedEmbedder, dot,
    l2_normalize,
};
pub use error::{EmbedError, Result};
pub use provider::{
    EmbedderKind, EmbedderSpec, EmbeddingProvider, ModelLoader, SpecLoader,
    default_local_model_dir,
};

#[cfg(feature = "local-embeddings")]
pub use embeddings::local::LocalEmbedder;
