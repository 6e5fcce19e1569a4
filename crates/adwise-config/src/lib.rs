//! Configuration system for adwise.
//!
//! Provides TOML-based configuration with:
//! - Named threshold profiles (`[profiles.baseline]`, `[profiles.weekly]`, ...)
//!   layered over the built-in defaults
//! - Embedding model selection (`[embedding]`)
//! - Storage locations for the metrics and memory databases
//! - Retrieval and run-indexing limits
//! - Config file layering (XDG user config + project-local overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, xdg_config_dir,
    xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
