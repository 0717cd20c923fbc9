//! Embedding service abstractions.
//!
//! Text queries are resolved to vectors through an [`EmbeddingService`]
//! owned by the search service. Embedding generation itself is an external
//! concern: the default [`ExternalEmbedding`] provider validates dimensions
//! but reports that embeddings must be supplied by the caller.

use crate::error::{Result, VicinityError};

/// Generates dense vector representations of text.
///
/// Implementations must be `Send + Sync`; the service is shared across
/// caller threads performing concurrent text searches.
///
/// # Implementing a Custom Provider
///
/// ```rust,ignore
/// use vicinity::embedding::EmbeddingService;
/// use vicinity::Result;
///
/// struct MyEmbeddingService {
///     client: MyApiClient,
///     dimension: usize,
/// }
///
/// impl EmbeddingService for MyEmbeddingService {
///     fn embed(&self, text: &str) -> Result<Vec<f32>> {
///         Ok(self.client.get_embedding(text)?)
///     }
///
///     fn dimension(&self) -> usize {
///         self.dimension
///     }
/// }
/// ```
pub trait EmbeddingService: Send + Sync {
    /// Generates an embedding for a single text.
    ///
    /// # Errors
    ///
    /// Returns [`VicinityError::Embedding`] if generation fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimension of the embeddings this service produces.
    fn dimension(&self) -> usize;

    /// Validates that an embedding has the expected dimension.
    fn validate_embedding(&self, embedding: &[f32]) -> Result<()> {
        let expected = self.dimension();
        if embedding.len() != expected {
            return Err(VicinityError::Validation(
                crate::error::ValidationError::dimension_mismatch(expected, embedding.len()),
            ));
        }
        Ok(())
    }
}

/// External embedding provider: dimensions are validated here, vectors are
/// computed elsewhere.
///
/// Calling [`embed`](EmbeddingService::embed) on this provider returns an
/// embedding error; supply pre-computed vectors or install a generating
/// service instead.
#[derive(Clone, Debug)]
pub struct ExternalEmbedding {
    dimension: usize,
}

impl ExternalEmbedding {
    /// Creates an external provider expecting the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl EmbeddingService for ExternalEmbedding {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(VicinityError::embedding(
            "external embedding mode: embeddings must be provided by the caller",
        ))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
