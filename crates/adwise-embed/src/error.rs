//! Error types for the embedding crate.

use thiserror::Error;

/// Result type alias using the embedding error type.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Errors that can occur while loading models or encoding text.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The model could not be loaded (missing files, bad credentials, ...).
    #[error("embedding model '{model}' unavailable: {reason}")]
    ModelUnavailable { model: String, reason: String },

    /// The model was loaded but failed to produce a usable vector.
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// Invalid provider configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP request to a remote provider failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote provider returned an error response.
    #[error("backend error: {0}")]
    Backend(String),

    /// Response parsing failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl EmbedError {
    /// Create a model-unavailable error.
    pub fn unavailable(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ModelUnavailable {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Whether the model itself could not be produced or reached, as
    /// opposed to a single encode going wrong.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::ModelUnavailable { .. } | Self::Http(_) | Self::Config(_)
        )
    }
}
