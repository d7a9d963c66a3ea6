//! Embedding vectors and the embedder that produces them.

use crate::backend::{EmbeddingBackend, EmbeddingRequest};
use crate::error::{AiError, ServiceError};
use crate::retry::Retrier;
use rootcause::prelude::ResultExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Default engine used by the embedding service.
pub const DEFAULT_EMBEDDING_ENGINE: &str = "text-embedding-ada-002";

/// A fixed-length vector describing the meaning of a text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Wraps raw vector components.
    #[must_use]
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Dimensionality.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Raw components.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Cosine similarity in `[-1, 1]`.
    ///
    /// Returns `None` when the dimensions differ and `0.0` when either vector
    /// has zero magnitude.
    #[must_use]
    pub fn cosine_similarity(&self, other: &Embedding) -> Option<f32> {
        if self.dim() != other.dim() {
            return None;
        }
        let (mut dot, mut left, mut right) = (0.0f64, 0.0f64, 0.0f64);
        for (a, b) in self.0.iter().zip(&other.0) {
            let (a, b) = (f64::from(*a), f64::from(*b));
            dot += a * b;
            left += a * a;
            right += b * b;
        }
        if left == 0.0 || right == 0.0 {
            return Some(0.0);
        }
        Some((dot / (left.sqrt() * right.sqrt())).clamp(-1.0, 1.0) as f32)
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Strips characters the embedding transport cannot carry.
///
/// Only ASCII survives, matching what the service accepts as input.
#[must_use]
pub fn sanitize_for_transport(text: &str) -> String {
    text.chars().filter(char::is_ascii).collect()
}

/// Produces embeddings through an [`EmbeddingBackend`].
///
/// Every call to [`Embedder::embed`] issues one request (plus rate-limit
/// retries). The first vector fixes the dimensionality; later vectors of a
/// different length are rejected.
pub struct Embedder {
    backend: Arc<dyn EmbeddingBackend>,
    engine: String,
    retrier: Retrier,
    dimensions: OnceLock<usize>,
}

impl fmt::Debug for Embedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Embedder")
            .field("engine", &self.engine)
            .field("retrier", &self.retrier)
            .field("dimensions", &self.dimensions.get())
            .finish_non_exhaustive()
    }
}

impl Embedder {
    /// Creates an embedder for the given backend and engine.
    #[must_use]
    pub fn new(
        backend: Arc<dyn EmbeddingBackend>,
        engine: impl Into<String>,
        retrier: Retrier,
    ) -> Self {
        Self {
            backend,
            engine: engine.into(),
            retrier,
            dimensions: OnceLock::new(),
        }
    }

    /// Engine identifier sent with every request.
    #[must_use]
    pub fn engine(&self) -> &str {
        &self.engine
    }

    /// Dimensionality seen so far, if any vector has been produced.
    #[must_use]
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions.get().copied()
    }

    /// Embeds `text` after sanitising it for transport.
    ///
    /// # Errors
    ///
    /// Returns the service failure (after retries) or `DimensionMismatch`
    /// when the vector length differs from earlier ones.
    pub async fn embed(&self, text: &str) -> colloquy_core::Result<Embedding, AiError> {
        self.embed_inner(text).await.context(AiError::Embedding {
            engine: self.engine.clone(),
        })
    }

    async fn embed_inner(&self, text: &str) -> Result<Embedding, ServiceError> {
        let request = EmbeddingRequest {
            engine: self.engine.clone(),
            input: sanitize_for_transport(text),
        };
        let embedding = self
            .retrier
            .call("embed", || self.backend.embed(&request))
            .await?;

        let expected = *self.dimensions.get_or_init(|| embedding.dim());
        if embedding.dim() != expected {
            return Err(ServiceError::DimensionMismatch {
                expected,
                actual: embedding.dim(),
            });
        }
        debug!(engine = %self.engine, dim = expected, "embedded text");
        Ok(embedding)
    }
}
