//! Embedding generation for ingestion and queries.
//!
//! [`EmbeddingProvider`] is the boundary to external model inference: text
//! in, fixed-dimension vector out. The production implementation uses
//! fastembed with the AllMiniLML6V2 model (384 dimensions); tests plug in
//! deterministic providers through the same trait.

use std::path::Path;
use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::vector::{VectorDimension, VectorError};

/// Trait for generating embeddings from text.
///
/// Implementations must be thread-safe and capable of handling batch
/// processing efficiently. The output dimension is fixed and known at
/// store construction time.
pub trait EmbeddingProvider: Send + Sync {
    /// Generates one embedding per input text, in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Generates an embedding for a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        let mut embeddings = self.embed_batch(&[text])?;
        embeddings.pop().ok_or_else(|| {
            VectorError::EmbeddingFailed("model returned no embedding for input".to_string())
        })
    }

    /// The dimension of embeddings produced by this provider.
    #[must_use]
    fn dimension(&self) -> VectorDimension;
}

/// FastEmbed implementation using the AllMiniLML6V2 model.
///
/// Produces 384-dimensional embeddings suited to semantic similarity over
/// document fragments.
pub struct FastEmbedProvider {
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
}

impl FastEmbedProvider {
    /// Creates a provider with the default model, caching model files
    /// under `cache_dir`.
    ///
    /// # Errors
    /// Returns an error if the model fails to initialize or download.
    pub fn new(cache_dir: impl AsRef<Path>) -> Result<Self, VectorError> {
        Self::with_model(EmbeddingModel::AllMiniLML6V2, cache_dir)
    }

    /// Creates a provider with a specific fastembed model.
    pub fn with_model(
        model: EmbeddingModel,
        cache_dir: impl AsRef<Path>,
    ) -> Result<Self, VectorError> {
        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir.as_ref().to_path_buf())
                .with_show_download_progress(false),
        )
        .map_err(|e| VectorError::EmbeddingFailed(
            format!("Failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download")
        ))?;

        // Probe the output dimension instead of trusting a constant
        let probe = text_model
            .embed(vec!["dimension probe".to_string()], None)
            .map_err(|e| VectorError::EmbeddingFailed(e.to_string()))?;
        let dimension = probe
            .into_iter()
            .next()
            .map(|v| v.len())
            .ok_or_else(|| {
                VectorError::EmbeddingFailed("model returned no probe embedding".to_string())
            })?;

        Ok(Self {
            model: Mutex::new(text_model),
            dimension: VectorDimension::new(dimension)?,
        })
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // fastembed expects owned strings for the embed method
        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        let embeddings = self
            .model
            .lock()
            .map_err(|_| {
                VectorError::EmbeddingFailed(
                    "Failed to acquire embedding model lock - model may be poisoned".to_string(),
                )
            })?
            .embed(text_strings, None)
            .map_err(|e| {
                VectorError::EmbeddingFailed(format!("Failed to generate embeddings: {e}"))
            })?;

        for embedding in &embeddings {
            if embedding.len() != self.dimension.get() {
                return Err(VectorError::DimensionMismatch {
                    expected: self.dimension.get(),
                    actual: embedding.len(),
                });
            }
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// Deterministic embedding provider for unit tests.
///
/// Hashes character trigrams into a fixed number of buckets and
/// normalizes, so equal texts embed identically and overlapping texts
/// land near each other.
#[cfg(test)]
pub struct HashEmbeddingProvider {
    dimension: VectorDimension,
}

#[cfg(test)]
impl HashEmbeddingProvider {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self { dimension }
    }
}

#[cfg(test)]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let dim = self.dimension.get();
        Ok(texts
            .iter()
            .map(|text| {
                let chars: Vec<char> = text.chars().collect();
                let mut embedding = vec![0.0f32; dim];
                for window in chars.windows(3.min(chars.len().max(1))) {
                    let mut hasher = DefaultHasher::new();
                    window.hash(&mut hasher);
                    let bucket = (hasher.finish() as usize) % dim;
                    embedding[bucket] += 1.0;
                }
                crate::vector::math::normalize(&mut embedding);
                embedding
            })
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}
