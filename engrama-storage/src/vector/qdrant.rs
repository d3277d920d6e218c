//! Qdrant-backed vector index
//!
//! Talks to the Qdrant REST API over HTTP. All writes pass `wait=true` so a
//! success response means the point is durable — the dual-store protocol
//! depends on that acknowledgement.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use engrama_core::{EngramaError, Result};

use super::{PointFilter, ScoredPoint, StoredPoint, VectorIndex, VectorPoint};

/// Vector index client for a Qdrant collection.
#[derive(Debug, Clone)]
pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    dimension: usize,
}

impl QdrantIndex {
    /// Build a client for `collection` at `endpoint` (e.g.
    /// `http://localhost:6333`).
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        collection: impl Into<String>,
        dimension: usize,
    ) -> Self {
        let base_url = endpoint.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            collection: collection.into(),
            dimension,
        }
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{suffix}", self.base_url, self.collection)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Value> {
        let response = builder
            .send()
            .await
            .map_err(|e| EngramaError::Storage(format!("vector store request: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngramaError::Storage(format!(
                "vector store returned {status}: {text}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| EngramaError::Storage(format!("vector store response: {e}")))
    }

    /// Fragment ids are stored without hyphens; Qdrant wants canonical
    /// UUIDs as point ids.
    fn to_point_id(id: &str) -> String {
        Uuid::parse_str(id).map_or_else(|_| id.to_string(), |u| u.hyphenated().to_string())
    }

    fn from_point_id(id: &Value) -> String {
        match id {
            Value::String(s) => s.replace('-', ""),
            other => other.to_string(),
        }
    }

    fn filter_to_json(filter: &PointFilter) -> Value {
        let mut must = vec![
            json!({"key": "tenant_id", "match": {"value": filter.tenant_id}}),
            json!({"key": "project_id", "match": {"value": filter.project_id}}),
        ];
        if let Some(user_id) = &filter.user_id {
            must.push(json!({"key": "user_id", "match": {"value": user_id}}));
        }
        if let Some(memory_type) = &filter.memory_type {
            must.push(json!({"key": "memory_type", "match": {"value": memory_type}}));
        }
        if let Some(session_id) = &filter.session_id {
            must.push(json!({"key": "session_id", "match": {"value": session_id}}));
        }
        json!({"must": must})
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct ScrollResponse {
    result: ScrollResult,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    #[serde(default)]
    points: Vec<ScrollPoint>,
}

#[derive(Debug, Deserialize)]
struct ScrollPoint {
    id: Value,
    #[serde(default)]
    payload: Option<serde_json::Map<String, Value>>,
}

fn payload_str(payload: Option<&serde_json::Map<String, Value>>, key: &str) -> String {
    payload
        .and_then(|p| p.get(key))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[async_trait::async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(&self) -> Result<()> {
        let response = self
            .request(reqwest::Method::GET, self.url(""))
            .send()
            .await
            .map_err(|e| EngramaError::Storage(format!("vector store request: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            info!(collection = %self.collection, "creating vector collection");
            self.send(
                self.request(reqwest::Method::PUT, self.url(""))
                    .json(&json!({
                        "vectors": {"size": self.dimension, "distance": "Cosine"}
                    })),
            )
            .await?;

            for field in ["tenant_id", "project_id", "user_id", "memory_type", "session_id"] {
                self.send(
                    self.request(reqwest::Method::PUT, self.url("/index?wait=true"))
                        .json(&json!({
                            "field_name": field,
                            "field_schema": "keyword"
                        })),
                )
                .await?;
            }
            info!(collection = %self.collection, "vector collection initialized");
        } else if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(EngramaError::Storage(format!(
                "vector store returned {status}: {text}"
            )));
        }
        Ok(())
    }

    async fn upsert(&self, point: VectorPoint) -> Result<()> {
        let payload = serde_json::to_value(&point.payload)?;
        self.send(
            self.request(reqwest::Method::PUT, self.url("/points?wait=true"))
                .json(&json!({
                    "points": [{
                        "id": Self::to_point_id(&point.id),
                        "vector": point.vector,
                        "payload": payload,
                    }]
                })),
        )
        .await?;
        debug!(id = %point.id, "vector point upserted");
        Ok(())
    }

    async fn update_content(&self, id: &str, vector: Vec<f32>, content: &str) -> Result<()> {
        let point_id = Self::to_point_id(id);
        self.send(
            self.request(reqwest::Method::PUT, self.url("/points/vectors?wait=true"))
                .json(&json!({
                    "points": [{"id": point_id, "vector": vector}]
                })),
        )
        .await?;
        self.send(
            self.request(reqwest::Method::POST, self.url("/points/payload?wait=true"))
                .json(&json!({
                    "payload": {"content": content},
                    "points": [point_id]
                })),
        )
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        filter: &PointFilter,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let body = self
            .send(
                self.request(reqwest::Method::POST, self.url("/points/search"))
                    .json(&json!({
                        "vector": vector,
                        "filter": Self::filter_to_json(filter),
                        "limit": limit,
                        "with_payload": ["content"],
                    })),
            )
            .await?;
        let parsed: SearchResponse = serde_json::from_value(body)?;
        Ok(parsed
            .result
            .into_iter()
            .map(|hit| ScoredPoint {
                id: Self::from_point_id(&hit.id),
                content: payload_str(hit.payload.as_ref(), "content"),
                score: hit.score,
            })
            .collect())
    }

    async fn scroll(&self, filter: &PointFilter, limit: usize) -> Result<Vec<StoredPoint>> {
        let body = self
            .send(
                self.request(reqwest::Method::POST, self.url("/points/scroll"))
                    .json(&json!({
                        "filter": Self::filter_to_json(filter),
                        "limit": limit,
                        "with_payload": ["content", "created_at"],
                    })),
            )
            .await?;
        let parsed: ScrollResponse = serde_json::from_value(body)?;
        Ok(parsed
            .result
            .points
            .into_iter()
            .map(|point| StoredPoint {
                id: Self::from_point_id(&point.id),
                content: payload_str(point.payload.as_ref(), "content"),
                created_at: payload_str(point.payload.as_ref(), "created_at"),
            })
            .collect())
    }

    async fn delete_points(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let point_ids: Vec<String> = ids.iter().map(|id| Self::to_point_id(id)).collect();
        self.send(
            self.request(reqwest::Method::POST, self.url("/points/delete?wait=true"))
                .json(&json!({"points": point_ids})),
        )
        .await?;
        Ok(())
    }

    async fn delete_by_scope(&self, tenant_id: &str, project_id: &str) -> Result<()> {
        self.send(
            self.request(reqwest::Method::POST, self.url("/points/delete?wait=true"))
                .json(&json!({
                    "filter": {
                        "must": [
                            {"key": "tenant_id", "match": {"value": tenant_id}},
                            {"key": "project_id", "match": {"value": project_id}},
                        ]
                    }
                })),
        )
        .await?;
        info!(tenant_id, project_id, "vector points purged for scope");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_id_round_trip() {
        let simple = "0123456789abcdef0123456789abcdef";
        let hyphenated = QdrantIndex::to_point_id(simple);
        assert_eq!(hyphenated, "01234567-89ab-cdef-0123-456789abcdef");
        assert_eq!(
            QdrantIndex::from_point_id(&Value::String(hyphenated)),
            simple
        );
    }

    #[test]
    fn filter_includes_only_present_conditions() {
        let filter = PointFilter {
            tenant_id: "t".into(),
            project_id: "p".into(),
            user_id: Some("u".into()),
            memory_type: Some("factual".into()),
            session_id: None,
        };
        let json = QdrantIndex::filter_to_json(&filter);
        let must = json["must"].as_array().unwrap();
        assert_eq!(must.len(), 4);
    }
}
