//! CLI command implementations.

pub mod analyze;
pub mod index_run;
pub mod ingest;
pub mod init;
pub mod prompt;
pub mod recall;
pub mod reindex;
pub mod stats;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use adwise_config::{AdwiseConfig, EmbeddingConfig, LoadedConfig};
use adwise_embed::{EmbedderKind, EmbedderSpec, EmbeddingProvider};
use adwise_memory::{DocType, MemoryStore};
use adwise_rules::MetricsDb;
use anyhow::{Context as _, Result};
use tracing::debug;

/// Environment variable consulted when no OpenAI key is configured.
const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";

/// Shared context for all commands.
pub struct Context {
    /// Merged configuration (user layer, project layer).
    pub config: AdwiseConfig,
    /// Metrics database path after CLI overrides.
    pub metrics_db: PathBuf,
    /// Memory database path after CLI overrides.
    pub memory_db: PathBuf,
    /// Whether to output JSON.
    pub json_output: bool,
    /// Verbose mode.
    pub verbose: bool,
}

impl Context {
    /// Discover config layers and apply CLI overrides.
    pub fn load(
        config_dir: Option<PathBuf>,
        metrics_db: Option<PathBuf>,
        memory_db: Option<PathBuf>,
        json_output: bool,
        verbose: bool,
    ) -> Result<Self> {
        let LoadedConfig { config, sources } =
            adwise_config::load_config_with_options(None, config_dir.as_deref())
                .context("Failed to load configuration")?;

        for source in sources.iter().filter(|s| s.loaded) {
            debug!("Loaded config from {}", source.path.display());
        }

        let metrics_db = metrics_db.unwrap_or_else(|| config.metrics().database);
        let memory_db = memory_db.unwrap_or_else(|| config.memory().database);

        Ok(Self {
            config,
            metrics_db,
            memory_db,
            json_output,
            verbose,
        })
    }

    /// Open (and create if needed) the metrics database.
    pub fn open_metrics(&self) -> Result<MetricsDb> {
        MetricsDb::open(&self.metrics_db).with_context(|| {
            format!("Failed to open metrics database at {}", self.metrics_db.display())
        })
    }

    /// Open (and create if needed) the memory store.
    pub fn open_memory(&self) -> Result<Arc<MemoryStore>> {
        let store = MemoryStore::open(&self.memory_db).with_context(|| {
            format!("Failed to open memory store at {}", self.memory_db.display())
        })?;
        Ok(Arc::new(store))
    }

    /// Embedding model id from `[embedding] model`.
    pub fn embedding_model(&self) -> String {
        self.config.embedding().model
    }

    /// Vector length every stored embedding must have.
    pub fn embedding_dimensions(&self) -> usize {
        self.config.embedding().effective_dimensions()
    }

    /// Build the embedding provider described by `[embedding]`.
    ///
    /// Nothing is loaded here; models load on first use.
    pub fn embedding_provider(&self) -> Arc<EmbeddingProvider> {
        Arc::new(EmbeddingProvider::from_spec(embedder_spec(
            &self.config.embedding(),
        )))
    }

    /// Document types searched by default, from `[retrieval] doc_types`.
    pub fn default_doc_types(&self) -> Result<Vec<DocType>> {
        parse_doc_types(&self.config.retrieval().doc_types)
    }
}

/// Translate the `[embedding]` section into a loader spec.
pub fn embedder_spec(config: &EmbeddingConfig) -> EmbedderSpec {
    let kind = match config.provider {
        adwise_config::EmbeddingProvider::Local => EmbedderKind::Local,
        adwise_config::EmbeddingProvider::OpenAi => EmbedderKind::OpenAi,
        adwise_config::EmbeddingProvider::Hash => EmbedderKind::Hash,
    };
    let mut spec = EmbedderSpec::new(kind, config.effective_dimensions());

    if let Some(openai) = &config.openai {
        if let Some(url) = &openai.base_url {
            spec = spec.with_openai_base_url(url.clone());
        }
        if let Some(key) = &openai.api_key {
            spec = spec.with_openai_api_key(key.clone());
        }
    }
    if spec.openai_api_key.is_none()
        && let Ok(key) = std::env::var(OPENAI_KEY_ENV)
        && !key.is_empty()
    {
        spec = spec.with_openai_api_key(key);
    }
    if let Some(dir) = config.local.as_ref().and_then(|l| l.model_dir.clone()) {
        spec = spec.with_local_model_dir(dir);
    }
    spec
}

/// Parse document type names, rejecting unknown ones.
pub fn parse_doc_types<S: AsRef<str>>(names: &[S]) -> Result<Vec<DocType>> {
    names
        .iter()
        .map(|name| {
            name.as_ref()
                .parse::<DocType>()
                .with_context(|| format!("Unknown document type '{}'", name.as_ref()))
        })
        .collect()
}

/// Today's date in local time.
pub fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

/// Read a UTF-8 input file, naming it in the error.
pub fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Write `contents` to a temporary sibling of `path`, then rename over it.
///
/// A failed write leaves any previous file at `path` untouched.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let file_name = path
        .file_name()
        .with_context(|| format!("Output path has no file name: {}", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, contents)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e).with_context(|| format!("Failed to move output into {}", path.display()));
    }
    debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_replaces_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("analysis_output.json");

        write_atomic(&path, "first").unwrap();
        write_atomic(&path, "second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_embedder_spec_from_config() {
        let config = AdwiseConfig::from_toml(
            r#"
[embedding]
provider = "hash"
model = "hash-64"
dimensions = 64
"#,
        )
        .unwrap();
        let spec = embedder_spec(&config.embedding());
        assert_eq!(spec.kind, EmbedderKind::Hash);
        assert_eq!(spec.dimensions, 64);
    }

    #[test]
    fn test_parse_doc_types() {
        let types = parse_doc_types(&["run_summary", "analysis"]).unwrap();
        assert_eq!(types, vec![DocType::RunSummary, DocType::Analysis]);
        assert!(parse_doc_types(&["bogus"]).is_err());
    }
}
