//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/adwise/config.toml` (XDG user config)
//! 2. `./adwise.toml` (project-local)
//! 3. CLI arguments (handled externally)

use std::path::{Path, PathBuf};

use crate::{AdwiseConfig, ConfigError, Result};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "adwise.toml";

/// Default config filename within XDG config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for XDG directory resolution.
const APP_NAME: &str = "adwise";

/// Environment variable to override the config directory.
const CONFIG_DIR_ENV: &str = "ADWISE_CONFIG_DIR";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file.
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: AdwiseConfig,
    /// Sources that were checked, in order of precedence (lowest first).
    pub sources: Vec<ConfigSource>,
}

impl LoadedConfig {
    /// Get paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Load configuration by discovering and merging all config layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Load configuration with explicit control over the user config directory.
///
/// `config_dir` overrides both `ADWISE_CONFIG_DIR` and the platform default.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = AdwiseConfig::new();
    let mut sources = Vec::new();

    // 1. User config: explicit override, then env var, then platform default
    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path)?);
    }

    // 2. Project-local config
    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path)?);

    Ok(LoadedConfig { config, sources })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<AdwiseConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    AdwiseConfig::from_toml(&contents)
}

/// Get the XDG config file path for adwise.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Get the XDG config directory for adwise.
///
/// Checks `ADWISE_CONFIG_DIR` env var first, then falls back to platform default.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Load a config file, if present, and merge it into the existing config.
///
/// A missing file is skipped. A layer that fails to read, parse, or carries
/// an invalid threshold profile aborts loading.
fn load_layer(config: &mut AdwiseConfig, path: &Path) -> Result<ConfigSource> {
    if !path.is_file() {
        return Ok(ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        });
    }

    let invalid = |e: ConfigError| ConfigError::InvalidLayer {
        path: path.display().to_string(),
        source: Box::new(e),
    };
    let layer = load_config_file(path).map_err(invalid)?;
    for (name, profile) in &layer.profiles {
        profile.validate(name).map_err(invalid)?;
    }

    config.merge(layer);
    Ok(ConfigSource {
        path: path.to_path_buf(),
        loaded: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_xdg_config_path_exists() {
        if let Some(p) = xdg_config_path() {
            assert!(p.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[analysis]
profile = "baseline"
"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.active_profile_name(), "baseline");
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_no_files() {
        let dir = TempDir::new().unwrap();
        let empty_config_dir = TempDir::new().unwrap();
        let loaded =
            load_config_with_options(Some(dir.path()), Some(empty_config_dir.path())).unwrap();
        assert!(loaded.config.analysis.is_none());
        assert!(loaded.loaded_from().is_empty());
    }

    #[test]
    fn test_load_config_layered_merge() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();

        fs::write(
            user.path().join("config.toml"),
            r#"
[analysis]
profile = "baseline"

[metrics]
database = "/var/lib/adwise/data.sqlite"
"#,
        )
        .unwrap();
        fs::write(
            project.path().join("adwise.toml"),
            r#"
[metrics]
database = "local.sqlite"
customer_id = "3778262392"
"#,
        )
        .unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        assert_eq!(loaded.loaded_from().len(), 2);

        let config = &loaded.config;
        assert_eq!(config.active_profile_name(), "baseline");
        let metrics = config.metrics();
        assert_eq!(metrics.database, PathBuf::from("local.sqlite"));
        assert_eq!(metrics.customer_id.as_deref(), Some("3778262392"));
    }

    #[test]
    fn test_malformed_layer_fails_load() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(project.path().join("adwise.toml"), "[[[ broken").unwrap();

        let err = load_config_with_options(Some(project.path()), Some(user.path())).unwrap_err();
        match err {
            ConfigError::InvalidLayer { path, source } => {
                assert!(path.ends_with("adwise.toml"));
                assert!(matches!(*source, ConfigError::Parse(_)));
            }
            other => panic!("expected InvalidLayer, got {other:?}"),
        }
    }

    #[test]
    fn test_mistyped_profile_fails_load() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(
            project.path().join("adwise.toml"),
            r#"
[profiles.weekly]
window_days = 30
search_terms = { min_clicks = "ten", min_cost = 20.0 }
campaign_winners = { min_roas = 1.2, min_conversions = 2.0, min_cost = 200.0 }
campaign_losers = { min_cost = 300.0, conversions_equals = 0.0 }
"#,
        )
        .unwrap();

        let err = load_config_with_options(Some(project.path()), Some(user.path())).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLayer { .. }));
    }

    #[test]
    fn test_invalid_profile_in_user_layer_fails_load() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(
            user.path().join("config.toml"),
            r#"
[profiles.monthly]
window_days = 0
search_terms = { min_clicks = 10, min_cost = 20.0 }
campaign_winners = { min_roas = 1.2, min_conversions = 2.0, min_cost = 200.0 }
campaign_losers = { min_cost = 300.0, conversions_equals = 0.0 }
"#,
        )
        .unwrap();

        let err = load_config_with_options(Some(project.path()), Some(user.path())).unwrap_err();
        match err {
            ConfigError::InvalidLayer { path, source } => {
                assert!(path.ends_with("config.toml"));
                assert!(matches!(*source, ConfigError::InvalidProfile { .. }));
            }
            other => panic!("expected InvalidLayer, got {other:?}"),
        }
    }
}
