//! Deterministic embedding provider for tests
//!
//! Character-statistics vectors: identical texts map to identical vectors,
//! similar texts land near each other. No network, no model.

use async_trait::async_trait;

use engrama_core::Result;

use super::EmbeddingProvider;

/// Test embedding provider
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    /// Provider with the given output dimension.
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new(128)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    #[allow(clippy::cast_precision_loss)]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embedding = vec![0.0f32; self.dimension];
        for (i, ch) in text.chars().enumerate() {
            embedding[i % self.dimension] += (ch as u32 as f32) / 1000.0;
        }
        let word_count = text.split_whitespace().count() as f32;
        let char_count = text.chars().count() as f32;
        if self.dimension > 1 {
            embedding[0] += word_count / 100.0;
            embedding[1] += char_count / 1000.0;
        }
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_and_sized() {
        let provider = MockEmbeddingProvider::default();
        let a = provider.embed("hello world").await.unwrap();
        let b = provider.embed("hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
    }
}
