//! Model loading and the per-model embedder cache.
//!
//! [`EmbeddingProvider`] hands out vectors for `(text, model_id)` pairs and
//! loads each model at most once per provider. Loading is delegated to a
//! [`ModelLoader`]; [`SpecLoader`] is the one built from application config.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::embeddings::{
    HashEmbedder, OpenAiEmbedder, OpenAiEmbedderConfig, SharedEmbedder, l2_normalize,
};
use crate::error::{EmbedError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Model Loading
// ─────────────────────────────────────────────────────────────────────────────

/// Produces an embedder for a model identifier.
pub trait ModelLoader: Send + Sync {
    /// Load the model named `model_id`.
    ///
    /// Returns [`EmbedError::ModelUnavailable`] when the model cannot be
    /// produced; implementations must not substitute a different model.
    fn load(&self, model_id: &str) -> Result<SharedEmbedder>;
}

/// Which backend a [`SpecLoader`] builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderKind {
    /// ONNX Runtime with model files on disk.
    Local,
    /// OpenAI-compatible `/embeddings` endpoint.
    OpenAi,
    /// Deterministic feature hashing.
    Hash,
}

/// Provider-agnostic description of how to build embedders.
///
/// The CLI populates this from the `[embedding]` config section, which keeps
/// this crate independent of the config crate.
#[derive(Debug, Clone)]
pub struct EmbedderSpec {
    /// Backend to build.
    pub kind: EmbedderKind,
    /// Output dimensions.
    pub dimensions: usize,
    /// OpenAI API key (required for [`EmbedderKind::OpenAi`]).
    pub openai_api_key: Option<String>,
    /// OpenAI base URL override.
    pub openai_base_url: Option<String>,
    /// Directory holding local model files.
    pub local_model_dir: Option<PathBuf>,
}

impl EmbedderSpec {
    /// Spec for the given backend with everything else unset.
    pub fn new(kind: EmbedderKind, dimensions: usize) -> Self {
        Self {
            kind,
            dimensions,
            openai_api_key: None,
            openai_base_url: None,
            local_model_dir: None,
        }
    }

    /// Set the OpenAI API key.
    pub fn with_openai_api_key(mut self, key: impl Into<String>) -> Self {
        self.openai_api_key = Some(key.into());
        self
    }

    /// Set the OpenAI base URL.
    pub fn with_openai_base_url(mut self, url: impl Into<String>) -> Self {
        self.openai_base_url = Some(url.into());
        self
    }

    /// Set the local model directory.
    pub fn with_local_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_model_dir = Some(dir.into());
        self
    }
}

/// [`ModelLoader`] driven by an [`EmbedderSpec`].
#[derive(Debug, Clone)]
pub struct SpecLoader {
    spec: EmbedderSpec,
}

impl SpecLoader {
    /// Create a loader for the given spec.
    pub fn new(spec: EmbedderSpec) -> Self {
        Self { spec }
    }

    /// The [`EmbedderSpec`] this loader builds from.
    pub fn spec(&self) -> &EmbedderSpec {
        &self.spec
    }

    fn load_openai(&self, model_id: &str) -> Result<SharedEmbedder> {
        let api_key = self.spec.openai_api_key.as_deref().ok_or_else(|| {
            EmbedError::unavailable(
                model_id,
                "OpenAI embedding provider requires an API key. \
                 Set OPENAI_API_KEY or configure [embedding.openai] api_key.",
            )
        })?;

        let mut config = OpenAiEmbedderConfig::new(api_key)
            .with_model(model_id)
            .with_dimensions(self.spec.dimensions);
        if let Some(ref base_url) = self.spec.openai_base_url {
            config = config.with_base_url(base_url);
        }
        Ok(Arc::new(OpenAiEmbedder::new(config)?))
    }

    #[cfg(feature = "local-embeddings")]
    fn load_local(&self, model_id: &str) -> Result<SharedEmbedder> {
        let (model_path, tokenizer_path) = self.local_model_files(model_id)?;
        let embedder = crate::embeddings::local::LocalEmbedder::load(
            model_id,
            &model_path,
            &tokenizer_path,
            self.spec.dimensions,
        )?;
        Ok(Arc::new(embedder))
    }

    #[cfg(not(feature = "local-embeddings"))]
    fn load_local(&self, model_id: &str) -> Result<SharedEmbedder> {
        // Surface missing files first; they are the more actionable problem.
        self.local_model_files(model_id)?;
        Err(EmbedError::unavailable(
            model_id,
            "local embeddings require building with the 'local-embeddings' feature",
        ))
    }

    /// Locate `model.onnx` and `tokenizer.json` for a model.
    ///
    /// Looks in `<dir>/<model id with '/' as '--'>/` first, then `<dir>/`.
    fn local_model_files(&self, model_id: &str) -> Result<(PathBuf, PathBuf)> {
        let base = self
            .spec
            .local_model_dir
            .clone()
            .or_else(default_local_model_dir)
            .ok_or_else(|| {
                EmbedError::unavailable(model_id, "no local model directory configured")
            })?;

        let candidates = [base.join(model_id.replace('/', "--")), base.clone()];
        for dir in &candidates {
            if let Some(files) = model_files_in(dir) {
                debug!(model = model_id, dir = %dir.display(), "found local model files");
                return Ok(files);
            }
        }

        Err(EmbedError::unavailable(
            model_id,
            format!(
                "model.onnx and tokenizer.json not found under {}",
                candidates[0].display()
            ),
        ))
    }
}

impl ModelLoader for SpecLoader {
    fn load(&self, model_id: &str) -> Result<SharedEmbedder> {
        match self.spec.kind {
            EmbedderKind::Hash => Ok(Arc::new(HashEmbedder::new(model_id, self.spec.dimensions))),
            EmbedderKind::OpenAi => self.load_openai(model_id),
            EmbedderKind::Local => self.load_local(model_id),
        }
    }
}

fn model_files_in(dir: &Path) -> Option<(PathBuf, PathBuf)> {
    let model = dir.join("model.onnx");
    let tokenizer = dir.join("tokenizer.json");
    (model.is_file() && tokenizer.is_file()).then_some((model, tokenizer))
}

/// Default directory for local embedding model files.
pub fn default_local_model_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("adwise").join("models"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding Provider
// ─────────────────────────────────────────────────────────────────────────────

/// Embeds text with a named model, loading each model once.
pub struct EmbeddingProvider {
    loader: Box<dyn ModelLoader>,
    models: Mutex<HashMap<String, SharedEmbedder>>,
}

impl EmbeddingProvider {
    /// Create a provider backed by the given loader.
    pub fn new(loader: impl ModelLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            models: Mutex::new(HashMap::new()),
        }
    }

    /// Create a provider from an embedder spec.
    pub fn from_spec(spec: EmbedderSpec) -> Self {
        Self::new(SpecLoader::new(spec))
    }

    /// Get the embedder for `model_id`, loading it on first use.
    pub fn model(&self, model_id: &str) -> Result<SharedEmbedder> {
        let mut models = self.models.lock();
        if let Some(embedder) = models.get(model_id) {
            return Ok(Arc::clone(embedder));
        }

        let embedder = self.loader.load(model_id)?;
        info!(
            model = model_id,
            dimensions = embedder.dimensions(),
            "embedding model loaded"
        );
        models.insert(model_id.to_string(), Arc::clone(&embedder));
        Ok(embedder)
    }

    /// Embed `text` with `model_id`, returning a unit-length vector.
    ///
    /// Fails with [`EmbedError::Encoding`] if the model produces a zero,
    /// empty or non-finite vector.
    pub async fn embed(&self, text: &str, model_id: &str) -> Result<Vec<f32>> {
        let embedder = self.model(model_id)?;
        let vector = embedder.embed(text).await?;
        finish_vector(vector)
    }

    /// Embed several texts with one model.
    pub async fn embed_batch(&self, texts: &[&str], model_id: &str) -> Result<Vec<Vec<f32>>> {
        let embedder = self.model(model_id)?;
        let vectors = embedder.embed_batch(texts).await?;
        if vectors.len() != texts.len() {
            return Err(EmbedError::Encoding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        vectors.into_iter().map(finish_vector).collect()
    }

    /// Identifiers of models loaded so far, sorted.
    pub fn loaded_models(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Validate and re-normalise a raw model output.
fn finish_vector(mut vector: Vec<f32>) -> Result<Vec<f32>> {
    if vector.is_empty() {
        return Err(EmbedError::Encoding("model returned an empty vector".to_string()));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(EmbedError::Encoding(
            "model returned non-finite values".to_string(),
        ));
    }
    if vector.iter().all(|v| *v == 0.0) {
        return Err(EmbedError::Encoding("model returned a zero vector".to_string()));
    }
    l2_normalize(&mut vector);
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::Embedder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts loads and hands out hash embedders.
    struct CountingLoader {
        loads: Arc<AtomicUsize>,
    }

    impl ModelLoader for CountingLoader {
        fn load(&self, model_id: &str) -> Result<SharedEmbedder> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(HashEmbedder::new(model_id, 16)))
        }
    }

    /// Returns a fixed vector regardless of input.
    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }

        fn dimensions(&self) -> usize {
            self.0.len()
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct FixedLoader(Vec<f32>);

    impl ModelLoader for FixedLoader {
        fn load(&self, _model_id: &str) -> Result<SharedEmbedder> {
            Ok(Arc::new(FixedEmbedder(self.0.clone())))
        }
    }

    #[tokio::test]
    async fn test_model_loaded_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let provider = EmbeddingProvider::new(CountingLoader {
            loads: Arc::clone(&loads),
        });

        provider.embed("first", "model-a").await.unwrap();
        provider.embed("second", "model-a").await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        provider.embed("third", "model-b").await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert_eq!(provider.loaded_models(), vec!["model-a", "model-b"]);
    }

    #[tokio::test]
    async fn test_embed_renormalises() {
        let provider = EmbeddingProvider::new(FixedLoader(vec![3.0, 4.0]));
        let v = provider.embed("anything", "fixed").await.unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_zero_vector_rejected() {
        let provider = EmbeddingProvider::new(FixedLoader(vec![0.0, 0.0, 0.0]));
        let err = provider.embed("anything", "fixed").await.unwrap_err();
        assert!(matches!(err, EmbedError::Encoding(_)));
        assert!(!err.is_unavailable());
    }

    #[tokio::test]
    async fn test_non_finite_rejected() {
        let provider = EmbeddingProvider::new(FixedLoader(vec![1.0, f32::NAN]));
        let err = provider.embed("anything", "fixed").await.unwrap_err();
        assert!(matches!(err, EmbedError::Encoding(_)));
    }

    #[tokio::test]
    async fn test_batch_matches_single() {
        let provider = EmbeddingProvider::from_spec(EmbedderSpec::new(EmbedderKind::Hash, 32));
        let batch = provider
            .embed_batch(&["winner campaign", "loser campaign"], "hash-32")
            .await
            .unwrap();
        let single = provider.embed("loser campaign", "hash-32").await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], single);
    }

    #[test]
    fn test_missing_local_model_is_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let loader = SpecLoader::new(
            EmbedderSpec::new(EmbedderKind::Local, 384).with_local_model_dir(dir.path()),
        );
        let err = loader.load("sentence-transformers/all-MiniLM-L6-v2").err().unwrap();
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("model.onnx"));
    }

    #[test]
    fn test_openai_without_key_is_unavailable() {
        let loader = SpecLoader::new(EmbedderSpec::new(EmbedderKind::OpenAi, 1536));
        let err = loader.load("text-embedding-3-small").err().unwrap();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_hash_loader_uses_model_id_as_name() {
        let loader = SpecLoader::new(EmbedderSpec::new(EmbedderKind::Hash, 8));
        let embedder = loader.load("hash-8").unwrap();
        assert_eq!(embedder.name(), "hash-8");
        assert_eq!(embedder.dimensions(), 8);
    }
}
