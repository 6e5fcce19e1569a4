//! Error types for the rules crate.

use adwise_config::ConfigError;
use thiserror::Error;

/// Result type alias using the rules error type.
pub type Result<T> = std::result::Result<T, RuleError>;

/// Errors from the rule engine and metrics store.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The threshold profile is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Metrics database operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem operation failed (creating the database directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row could not be interpreted.
    #[error("invalid metrics data: {0}")]
    InvalidData(String),
}
