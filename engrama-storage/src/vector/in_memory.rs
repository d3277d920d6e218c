//! In-memory vector index
//!
//! Brute-force cosine similarity over a `HashMap`. For tests and small
//! deployments without an external vector store.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use engrama_core::Result;

use super::{PointFilter, PointPayload, ScoredPoint, StoredPoint, VectorIndex, VectorPoint};

#[derive(Debug, Clone)]
struct StoredRecord {
    vector: Vec<f32>,
    payload: PointPayload,
}

/// Thread-safe in-memory [`VectorIndex`]
#[derive(Debug, Clone, Default)]
pub struct InMemoryIndex {
    points: Arc<RwLock<HashMap<String, StoredRecord>>>,
}

impl InMemoryIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    /// True when no point is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.read().is_empty()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }

    fn matches(filter: &PointFilter, payload: &PointPayload) -> bool {
        if payload.tenant_id != filter.tenant_id || payload.project_id != filter.project_id {
            return false;
        }
        if let Some(user_id) = &filter.user_id {
            if &payload.user_id != user_id {
                return false;
            }
        }
        if let Some(memory_type) = &filter.memory_type {
            if &payload.memory_type != memory_type {
                return false;
            }
        }
        if let Some(session_id) = &filter.session_id {
            if payload.session_id.as_ref() != Some(session_id) {
                return false;
            }
        }
        true
    }
}

#[async_trait::async_trait]
impl VectorIndex for InMemoryIndex {
    async fn ensure_collection(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, point: VectorPoint) -> Result<()> {
        self.points.write().insert(
            point.id,
            StoredRecord {
                vector: point.vector,
                payload: point.payload,
            },
        );
        Ok(())
    }

    async fn update_content(&self, id: &str, vector: Vec<f32>, content: &str) -> Result<()> {
        if let Some(record) = self.points.write().get_mut(id) {
            record.vector = vector;
            record.payload.content = content.to_string();
        }
        Ok(())
    }

    async fn query(
        &self,
        filter: &PointFilter,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let mut hits: Vec<ScoredPoint> = {
            let points = self.points.read();
            points
                .iter()
                .filter(|(_, record)| Self::matches(filter, &record.payload))
                .map(|(id, record)| ScoredPoint {
                    id: id.clone(),
                    content: record.payload.content.clone(),
                    score: Self::cosine_similarity(vector, &record.vector),
                })
                .collect()
        };
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn scroll(&self, filter: &PointFilter, limit: usize) -> Result<Vec<StoredPoint>> {
        let mut matched: Vec<StoredPoint> = {
            let points = self.points.read();
            points
                .iter()
                .filter(|(_, record)| Self::matches(filter, &record.payload))
                .map(|(id, record)| StoredPoint {
                    id: id.clone(),
                    content: record.payload.content.clone(),
                    created_at: record.payload.created_at.clone(),
                })
                .collect()
        };
        // Deterministic enumeration order before the cut
        matched.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        matched.truncate(limit);
        Ok(matched)
    }

    async fn delete_points(&self, ids: &[String]) -> Result<()> {
        let mut points = self.points.write();
        for id in ids {
            points.remove(id);
        }
        Ok(())
    }

    async fn delete_by_scope(&self, tenant_id: &str, project_id: &str) -> Result<()> {
        self.points.write().retain(|_, record| {
            record.payload.tenant_id != tenant_id || record.payload.project_id != project_id
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, user: &str, vector: Vec<f32>) -> VectorPoint {
        VectorPoint {
            id: id.to_string(),
            vector,
            payload: PointPayload {
                tenant_id: "t1".into(),
                project_id: "p1".into(),
                user_id: user.into(),
                memory_type: "factual".into(),
                session_id: None,
                content: format!("content-{id}"),
                created_at: format!("2026-01-0{}T00:00:00+00:00", id.len()),
            },
        }
    }

    #[tokio::test]
    async fn query_filters_by_scope_and_ranks_by_similarity() {
        let index = InMemoryIndex::new();
        index.upsert(point("a", "u1", vec![1.0, 0.0])).await.unwrap();
        index.upsert(point("bb", "u1", vec![0.0, 1.0])).await.unwrap();
        index.upsert(point("ccc", "u2", vec![1.0, 0.0])).await.unwrap();

        let filter = PointFilter {
            tenant_id: "t1".into(),
            project_id: "p1".into(),
            user_id: Some("u1".into()),
            ..PointFilter::default()
        };
        let hits = index.query(&filter, &[1.0, 0.1], 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn delete_by_scope_removes_only_that_project() {
        let index = InMemoryIndex::new();
        index.upsert(point("a", "u1", vec![1.0])).await.unwrap();
        let mut other = point("zz", "u1", vec![1.0]);
        other.payload.project_id = "p2".into();
        index.upsert(other).await.unwrap();

        index.delete_by_scope("t1", "p1").await.unwrap();
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn update_content_rewrites_vector_and_payload() {
        let index = InMemoryIndex::new();
        index.upsert(point("a", "u1", vec![1.0, 0.0])).await.unwrap();
        index
            .update_content("a", vec![0.0, 1.0], "rewritten")
            .await
            .unwrap();

        let filter = PointFilter {
            tenant_id: "t1".into(),
            project_id: "p1".into(),
            user_id: Some("u1".into()),
            ..PointFilter::default()
        };
        let hits = index.query(&filter, &[0.0, 1.0], 1).await.unwrap();
        assert_eq!(hits[0].content, "rewritten");
        assert!(hits[0].score > 0.99);
    }
}
