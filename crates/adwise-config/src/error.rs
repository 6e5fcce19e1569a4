//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading and resolution.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize config.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A config file exists but could not be used.
    #[error("invalid config file '{path}': {source}")]
    InvalidLayer {
        path: String,
        source: Box<ConfigError>,
    },

    /// Requested threshold profile does not exist.
    #[error("threshold profile '{name}' not found (available: {available})")]
    ProfileNotFound { name: String, available: String },

    /// Threshold profile violates an invariant.
    #[error("invalid threshold profile '{name}': {reason}")]
    InvalidProfile { name: String, reason: String },

    /// Other error.
    #[error("{0}")]
    Other(String),
}
