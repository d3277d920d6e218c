//! HTTP embedding provider
//!
//! Posts `{"inputs": text}` to `<endpoint>/embed` with optional bearer
//! auth. The service may answer with a batch (`[[f32]]`) or a single
//! vector (`[f32]`); both shapes are accepted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use engrama_core::{EngramaError, Result};

use super::EmbeddingProvider;

/// Remote embedding service client
#[derive(Debug, Clone)]
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbedResponse {
    Batch(Vec<Vec<f32>>),
    Single(Vec<f32>),
}

impl HttpEmbeddingProvider {
    /// Build a client for the service at `endpoint`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, dimension: usize) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embed", self.endpoint);
        let mut request = self.client.post(&url).json(&EmbedRequest { inputs: text });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngramaError::Embedding(format!("embedding request: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngramaError::Embedding(format!(
                "embedding service returned {status}: {text}"
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EngramaError::Embedding(format!("embedding response: {e}")))?;
        let vector = match parsed {
            EmbedResponse::Batch(mut batch) => {
                if batch.is_empty() {
                    return Err(EngramaError::Embedding(
                        "embedding service returned no vectors".to_string(),
                    ));
                }
                batch.swap_remove(0)
            }
            EmbedResponse::Single(vector) => vector,
        };
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
