//! Embedding clients
//!
//! The embedding service is remote: `encode(text) → vector`. The provider
//! trait is the seam; the HTTP implementation talks to a TEI-style
//! `/embed` endpoint, and the mock produces deterministic vectors for
//! tests.

use async_trait::async_trait;

use engrama_core::Result;

mod http;
mod mock;

pub use http::HttpEmbeddingProvider;
pub use mock::MockEmbeddingProvider;

/// Encodes text into a fixed-dimension vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Encode one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Output vector dimension.
    fn dimension(&self) -> usize;
}
