//! Vector index abstraction
//!
//! One shared collection holds a point per fragment id; isolation is
//! enforced by payload filtering, never by collection naming. The payload
//! is minimal — the metadata store is the long-form authority and search
//! results are hydrated from it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use engrama_core::{MemoryScope, Result};

mod in_memory;
mod qdrant;

pub use in_memory::InMemoryIndex;
pub use qdrant::QdrantIndex;

/// Minimal per-point payload: what filtering and ranking need, nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointPayload {
    /// Owning tenant
    pub tenant_id: String,
    /// Owning project
    pub project_id: String,
    /// Owning end user
    pub user_id: String,
    /// Memory type name
    pub memory_type: String,
    /// Session grouping, when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Fragment content (identical to the metadata store's copy)
    pub content: String,
    /// RFC 3339 creation time
    pub created_at: String,
}

/// A point to upsert: fragment id, embedding, payload.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    /// Fragment id
    pub id: String,
    /// Embedding vector
    pub vector: Vec<f32>,
    /// Filter/ranking payload
    pub payload: PointPayload,
}

/// Payload filter. Every query carries the scope; the optional fields
/// narrow by type or session.
#[derive(Debug, Clone, Default)]
pub struct PointFilter {
    /// Owning tenant
    pub tenant_id: String,
    /// Owning project
    pub project_id: String,
    /// Owning end user (absent only for scope-wide cleanup)
    pub user_id: Option<String>,
    /// Narrow to one memory type
    pub memory_type: Option<String>,
    /// Narrow to one session
    pub session_id: Option<String>,
}

impl PointFilter {
    /// Filter pinned to a full scope triple.
    #[must_use]
    pub fn for_scope(scope: &MemoryScope) -> Self {
        Self {
            tenant_id: scope.tenant_id.clone(),
            project_id: scope.project_id.clone(),
            user_id: Some(scope.user_id.clone()),
            memory_type: None,
            session_id: None,
        }
    }

    /// Narrow to a memory type.
    #[must_use]
    pub fn with_memory_type(mut self, memory_type: Option<String>) -> Self {
        self.memory_type = memory_type;
        self
    }

    /// Narrow to a session.
    #[must_use]
    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }
}

/// A ranked search hit: id, content, similarity score (cosine; higher is
/// more similar). Scores pass through from the index unmodified.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Fragment id
    pub id: String,
    /// Content from the payload
    pub content: String,
    /// Cosine similarity
    pub score: f32,
}

/// A scrolled point: id, content, and creation time for ordering.
#[derive(Debug, Clone)]
pub struct StoredPoint {
    /// Fragment id
    pub id: String,
    /// Content from the payload
    pub content: String,
    /// RFC 3339 creation time
    pub created_at: String,
}

/// Approximate-nearest-neighbor store keyed by fragment id.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the shared collection if missing, with cosine distance and
    /// keyword indexes on the filterable payload fields.
    async fn ensure_collection(&self) -> Result<()>;

    /// Insert or replace one point.
    async fn upsert(&self, point: VectorPoint) -> Result<()>;

    /// Rewrite the vector and the content payload of an existing point.
    async fn update_content(&self, id: &str, vector: Vec<f32>, content: &str) -> Result<()>;

    /// Similarity query under a filter. Returns at most `limit` points,
    /// best first.
    async fn query(
        &self,
        filter: &PointFilter,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;

    /// Filtered enumeration without ranking.
    async fn scroll(&self, filter: &PointFilter, limit: usize) -> Result<Vec<StoredPoint>>;

    /// Delete points by id.
    async fn delete_points(&self, ids: &[String]) -> Result<()>;

    /// Delete every point whose payload matches `(tenant_id, project_id)`.
    /// Used for best-effort cleanup when a channel is torn down.
    async fn delete_by_scope(&self, tenant_id: &str, project_id: &str) -> Result<()>;
}
