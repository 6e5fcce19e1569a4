//! Embedders: text in, unit-length vector out.
//!
//! # Implementations
//!
//! - [`HashEmbedder`]: Deterministic feature-hashing embeddings, no model files
//! - [`OpenAiEmbedder`]: Uses OpenAI's embeddings API
//! - `LocalEmbedder`: Uses ONNX Runtime for local inference (requires `local-embeddings` feature)

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{EmbedError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Embedder Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for generating text embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts in a batch.
    ///
    /// Default implementation calls `embed` for each text sequentially.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Get the dimensionality of embeddings produced by this embedder.
    fn dimensions(&self) -> usize;

    /// Get the model identifier of this embedder.
    fn name(&self) -> &str;
}

/// A shared embedder that can be used across threads.
pub type SharedEmbedder = Arc<dyn Embedder>;

// ─────────────────────────────────────────────────────────────────────────────
// Hash Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// Deterministic embedder based on feature hashing.
///
/// Each lowercase alphanumeric token is hashed into one of `dimensions`
/// buckets with a hash-derived sign, so texts sharing vocabulary score a
/// positive similarity. Text without tokens falls back to a pseudo-random
/// vector seeded from the whole input.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    name: String,
    dimensions: usize,
}

impl HashEmbedder {
    /// Create a hash embedder identified by `name` with the given dimensions.
    pub fn new(name: impl Into<String>, dimensions: usize) -> Self {
        Self {
            name: name.into(),
            dimensions,
        }
    }

    /// Encode synchronously; the async trait method delegates here.
    pub fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];
        if self.dimensions == 0 {
            return embedding;
        }

        let mut tokens = 0usize;
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = simple_hash(&token.to_lowercase());
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
            tokens += 1;
        }

        if tokens == 0 {
            let mut state = simple_hash(text);
            for value in embedding.iter_mut() {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                *value = ((state >> 16) as u16 as f32 / 32768.0) - 1.0;
            }
        }

        l2_normalize(&mut embedding);
        embedding
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.encode(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// djb2 string hash.
fn simple_hash(s: &str) -> u64 {
    let mut hash: u64 = 5381;
    for byte in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(byte as u64);
    }
    hash
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI Embedder
// ─────────────────────────────────────────────────────────────────────────────

use reqwest::Client;
use std::time::Duration;

/// Configuration for OpenAI embeddings.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedderConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Base URL for the API.
    pub base_url: String,
    /// Model to use for embeddings.
    pub model: String,
    /// Requested output dimensions.
    pub dimensions: usize,
    /// Request timeout.
    pub timeout: Duration,
}

impl OpenAiEmbedderConfig {
    /// Create a new config with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            timeout: Duration::from_secs(60),
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the output dimensions.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }
}

/// OpenAI embeddings API client.
pub struct OpenAiEmbedder {
    client: Client,
    config: OpenAiEmbedderConfig,
}

impl OpenAiEmbedder {
    /// Create a new OpenAI embedder.
    pub fn new(config: OpenAiEmbedderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbedError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Encoding("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: self.config.model.clone(),
            input: texts.iter().map(|s| s.to_string()).collect(),
            dimensions: Some(self.config.dimensions),
        };

        let response = self
            .client
            .post(self.embeddings_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Backend(format!(
                "Embedding request failed: HTTP {} - {}",
                status, body
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::Serialization(format!("Failed to parse response: {}", e)))?;

        // Sort by index to ensure correct order
        let mut embeddings: Vec<_> = result.data.into_iter().collect();
        embeddings.sort_by_key(|e| e.index);

        Ok(embeddings.into_iter().map(|e| e.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, serde::Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Local Embedder (ONNX Runtime)
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "local-embeddings")]
pub mod local {
    //! Local embeddings using ONNX Runtime.
    //!
    //! This module requires the `local-embeddings` feature to be enabled.

    use super::*;
    use ndarray::Array2;
    use ort::session::Session;
    use ort::session::builder::GraphOptimizationLevel;
    use ort::value::Tensor;
    use parking_lot::Mutex;
    use std::path::Path;
    use tokenizers::Tokenizer;

    /// Local embedder using ONNX Runtime with mean pooling.
    pub struct LocalEmbedder {
        session: Mutex<Session>,
        tokenizer: Tokenizer,
        dimensions: usize,
        name: String,
    }

    impl LocalEmbedder {
        /// Load a local embedder from model files.
        ///
        /// # Arguments
        /// * `name` - Model identifier reported by [`Embedder::name`]
        /// * `model_path` - Path to the ONNX model file
        /// * `tokenizer_path` - Path to the tokenizer.json file
        /// * `dimensions` - Output embedding dimensions
        pub fn load(
            name: impl Into<String>,
            model_path: impl AsRef<Path>,
            tokenizer_path: impl AsRef<Path>,
            dimensions: usize,
        ) -> Result<Self> {
            let name = name.into();
            let unavailable = |reason: String| EmbedError::unavailable(name.clone(), reason);

            let session = Session::builder()
                .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
                .and_then(|b| b.commit_from_file(model_path.as_ref()))
                .map_err(|e| {
                    unavailable(format!(
                        "failed to load ONNX model from {:?}: {}",
                        model_path.as_ref(),
                        e
                    ))
                })?;

            let tokenizer = Tokenizer::from_file(tokenizer_path.as_ref()).map_err(|e| {
                unavailable(format!(
                    "failed to load tokenizer from {:?}: {}",
                    tokenizer_path.as_ref(),
                    e
                ))
            })?;

            Ok(Self {
                session: Mutex::new(session),
                tokenizer,
                dimensions,
                name,
            })
        }

        /// Run ONNX inference on a batch of encodings, padding every
        /// sequence to the longest one.
        fn run_batch(&self, encodings: &[tokenizers::Encoding]) -> Result<Vec<Vec<f32>>> {
            let batch_size = encodings.len();
            let max_len = encodings
                .iter()
                .map(|e| e.get_ids().len())
                .max()
                .unwrap_or(0);

            let mut input_ids = vec![0i64; batch_size * max_len];
            let mut attention_mask = vec![0i64; batch_size * max_len];
            let mut token_type_ids = vec![0i64; batch_size * max_len];

            for (i, enc) in encodings.iter().enumerate() {
                let offset = i * max_len;
                for (j, ((id, mask), ty)) in enc
                    .get_ids()
                    .iter()
                    .zip(enc.get_attention_mask())
                    .zip(enc.get_type_ids())
                    .enumerate()
                {
                    input_ids[offset + j] = *id as i64;
                    attention_mask[offset + j] = *mask as i64;
                    token_type_ids[offset + j] = *ty as i64;
                }
            }

            let encoding_err = |e: String| EmbedError::Encoding(e);
            let to_tensor = |flat: Vec<i64>| -> Result<Tensor<i64>> {
                let array = Array2::from_shape_vec((batch_size, max_len), flat)
                    .map_err(|e| encoding_err(format!("array error: {e}")))?;
                Tensor::from_array(array).map_err(|e| encoding_err(format!("tensor error: {e}")))
            };

            let inputs = ort::inputs![
                "input_ids" => to_tensor(input_ids)?,
                "attention_mask" => to_tensor(attention_mask.clone())?,
                "token_type_ids" => to_tensor(token_type_ids)?,
            ];

            let mut session = self.session.lock();
            let outputs = session
                .run(inputs)
                .map_err(|e| encoding_err(format!("ONNX inference failed: {e}")))?;

            // (batch_size, seq_len, hidden_dim), flattened row-major
            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| encoding_err(format!("output extraction failed: {e}")))?;
            if shape.len() != 3 {
                return Err(encoding_err(format!(
                    "unexpected output rank {}",
                    shape.len()
                )));
            }
            let seq_len = shape[1] as usize;
            let hidden_dim = shape[2] as usize;

            let mut results = Vec::with_capacity(batch_size);
            for i in 0..batch_size {
                let mask = &attention_mask[i * max_len..(i + 1) * max_len];
                let mut sum = vec![0.0f32; hidden_dim];
                let mut count = 0.0f32;

                for (j, &mask_val) in mask.iter().enumerate().take(seq_len) {
                    if mask_val > 0 {
                        let row = &data[(i * seq_len + j) * hidden_dim..][..hidden_dim];
                        for (acc, v) in sum.iter_mut().zip(row) {
                            *acc += v;
                        }
                        count += 1.0;
                    }
                }

                if count > 0.0 {
                    for v in &mut sum {
                        *v /= count;
                    }
                }
                l2_normalize(&mut sum);
                results.push(sum);
            }

            Ok(results)
        }
    }

    #[async_trait]
    impl Embedder for LocalEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let results = self.embed_batch(&[text]).await?;
            results
                .into_iter()
                .next()
                .ok_or_else(|| EmbedError::Encoding("No embedding returned".to_string()))
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }

            let encodings: Vec<_> = texts
                .iter()
                .map(|text| {
                    self.tokenizer
                        .encode(*text, true)
                        .map_err(|e| EmbedError::Encoding(format!("Tokenization failed: {}", e)))
                })
                .collect::<Result<Vec<_>>>()?;

            // Process in chunks to avoid OOM on large batches
            let mut all_results = Vec::with_capacity(texts.len());
            for chunk in encodings.chunks(32) {
                all_results.extend(self.run_batch(chunk)?);
            }

            Ok(all_results)
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn name(&self) -> &str {
            &self.name
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Utility Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Scale a vector to unit length in place. Zero vectors are left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product; equals cosine similarity for unit-length inputs.
///
/// Returns 0.0 for vectors of different lengths.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[tokio::test]
    async fn test_hash_embedder() {
        let embedder = HashEmbedder::new("hash-test", 384);
        assert_eq!(embedder.dimensions(), 384);
        assert_eq!(embedder.name(), "hash-test");

        let embedding = embedder.embed("hello world").await.unwrap();
        assert_eq!(embedding.len(), 384);
        assert!((norm(&embedding) - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_hash_embedder_deterministic() {
        let embedder = HashEmbedder::new("hash-test", 64);
        let e1 = embedder.embed("pause campaign Brand BR").await.unwrap();
        let e2 = embedder.embed("pause campaign Brand BR").await.unwrap();
        assert_eq!(e1, e2);
    }

    #[tokio::test]
    async fn test_hash_embedder_shared_vocabulary_scores_higher() {
        let embedder = HashEmbedder::new("hash-test", 256);
        let query = embedder.embed("negative keyword free trial").await.unwrap();
        let related = embedder
            .embed("add free trial as a negative keyword")
            .await
            .unwrap();
        let unrelated = embedder.embed("scale budget on winners").await.unwrap();

        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_hash_embedder_without_tokens_is_not_zero() {
        let embedder = HashEmbedder::new("hash-test", 16);
        let embedding = embedder.embed("   ---   ").await.unwrap();
        assert!((norm(&embedding) - 1.0).abs() < 0.001);

        let empty = embedder.embed("").await.unwrap();
        assert!((norm(&empty) - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_embed_batch() {
        let embedder = HashEmbedder::new("hash-test", 32);
        let embeddings = embedder.embed_batch(&["one", "two", "three"]).await.unwrap();

        assert_eq!(embeddings.len(), 3);
        for emb in &embeddings {
            assert_eq!(emb.len(), 32);
        }
        assert_ne!(embeddings[0], embeddings[1]);
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_dot() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((dot(&a, &a) - 1.0).abs() < 0.001);
        assert!(dot(&a, &[0.0, 1.0, 0.0]).abs() < 0.001);
        assert!((dot(&a, &[-1.0, 0.0, 0.0]) + 1.0).abs() < 0.001);
        assert_eq!(dot(&a, &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_openai_embedder_config_builder() {
        let config = OpenAiEmbedderConfig::new("key")
            .with_base_url("http://custom.api")
            .with_model("text-embedding-3-large")
            .with_dimensions(3072);

        assert_eq!(config.api_key, "key");
        assert_eq!(config.base_url, "http://custom.api");
        assert_eq!(config.model, "text-embedding-3-large");
        assert_eq!(config.dimensions, 3072);
    }
}
