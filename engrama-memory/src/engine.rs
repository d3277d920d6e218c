//! Memory engine — the dual-store protocol
//!
//! Write path: metadata row first, then encode and upsert the vector. A
//! failure on the vector side deletes the row again (compensation) so the
//! index never references a fragment the authority will not vouch for.
//! Read path: rank in the vector index, hydrate from the metadata store,
//! silently drop any point whose row is gone.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use engrama_core::types::generate_id;
use engrama_core::{
    EngramaError, MemoryFragment, MemoryScope, MemoryType, Result, Role,
};
use engrama_storage::meta::{FragmentPatch, MetaStore, UserStats};
use engrama_storage::vector::{PointFilter, PointPayload, VectorIndex, VectorPoint};

use crate::embeddings::EmbeddingProvider;

/// Fields for a new fragment. Scope arrives separately — it comes from the
/// admission pipeline, never from the body.
#[derive(Debug, Clone)]
pub struct NewFragment {
    /// The text to remember
    pub content: String,
    /// Filter label
    pub memory_type: MemoryType,
    /// Speaker, for session messages
    pub role: Option<Role>,
    /// Session grouping, for session messages
    pub session_id: Option<String>,
    /// Free-form labels
    pub tags: Vec<String>,
    /// Weight in `[0, 1]`
    pub importance: f64,
    /// Arbitrary structured payload
    pub metadata: Option<Value>,
}

/// Partial update. The four fields here are the whitelist; requests naming
/// anything else are rejected before this type is built.
#[derive(Debug, Clone, Default)]
pub struct UpdateFields {
    /// Replacement content (re-vectorizes)
    pub content: Option<String>,
    /// Replacement tags
    pub tags: Option<Vec<String>>,
    /// Replacement importance
    pub importance: Option<f64>,
    /// Replacement metadata
    pub metadata: Option<Value>,
}

/// A search result: the hydrated fragment plus the index's similarity
/// score, passed through unmodified.
#[derive(Debug, Clone)]
pub struct ScoredFragment {
    /// Hydrated fragment
    pub fragment: MemoryFragment,
    /// Cosine similarity from the vector index
    pub score: f32,
}

/// Chat-shaped view of a session message
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatMessage {
    /// Speaker name (`user` when the fragment has no role)
    pub role: String,
    /// Message text
    pub content: String,
}

/// Orchestrates the metadata store, the vector index, and the embedding
/// service.
pub struct MemoryEngine {
    meta: Arc<dyn MetaStore>,
    vectors: Arc<dyn VectorIndex>,
    embeddings: Arc<dyn EmbeddingProvider>,
}

impl MemoryEngine {
    /// Compose an engine from its three collaborators.
    #[must_use]
    pub fn new(
        meta: Arc<dyn MetaStore>,
        vectors: Arc<dyn VectorIndex>,
        embeddings: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            meta,
            vectors,
            embeddings,
        }
    }

    /// The authoritative metadata store.
    #[must_use]
    pub fn meta(&self) -> &Arc<dyn MetaStore> {
        &self.meta
    }

    /// Add a fragment.
    ///
    /// Metadata first; on vector-side failure the row is compensated away
    /// and the error surfaces as `vector_write_failed` (or the embedding
    /// error when encoding itself failed).
    ///
    /// # Errors
    ///
    /// [`EngramaError::Storage`] on metadata failure (nothing written),
    /// [`EngramaError::Embedding`] / [`EngramaError::VectorWriteFailed`]
    /// after compensation.
    pub async fn add(&self, scope: &MemoryScope, new: NewFragment) -> Result<MemoryFragment> {
        let now = Utc::now();
        let fragment = MemoryFragment {
            id: generate_id(),
            tenant_id: scope.tenant_id.clone(),
            project_id: scope.project_id.clone(),
            user_id: scope.user_id.clone(),
            memory_type: new.memory_type,
            content: new.content,
            role: new.role,
            session_id: new.session_id,
            tags: new.tags,
            importance: new.importance,
            hit_count: 0,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        };

        self.meta.insert_fragment(fragment.clone()).await?;

        let vector = match self.embeddings.embed(&fragment.content).await {
            Ok(vector) => vector,
            Err(e) => {
                self.compensate(&fragment.id).await;
                return Err(e);
            }
        };

        let point = VectorPoint {
            id: fragment.id.clone(),
            vector,
            payload: payload_for(&fragment),
        };
        if let Err(e) = self.vectors.upsert(point).await {
            warn!(id = %fragment.id, error = %e, "vector upsert failed, compensating metadata row");
            self.compensate(&fragment.id).await;
            return Err(EngramaError::VectorWriteFailed(e.to_string()));
        }

        info!(
            id = %fragment.id,
            user = %scope.user_id,
            memory_type = %fragment.memory_type,
            "memory added"
        );
        Ok(fragment)
    }

    /// Add a session message: a `session`-typed fragment with role and
    /// session id populated.
    ///
    /// # Errors
    ///
    /// Same as [`MemoryEngine::add`].
    pub async fn add_message(
        &self,
        scope: &MemoryScope,
        content: String,
        role: Role,
        session_id: String,
        metadata: Option<Value>,
    ) -> Result<MemoryFragment> {
        self.add(
            scope,
            NewFragment {
                content,
                memory_type: MemoryType::Session,
                role: Some(role),
                session_id: Some(session_id),
                tags: Vec::new(),
                importance: 0.0,
                metadata,
            },
        )
        .await
    }

    /// Semantic search: rank in the vector index, hydrate from the
    /// metadata store, drop orphans, bump hit counts best-effort.
    ///
    /// # Errors
    ///
    /// Embedding or vector-query failures. Hit-count failures never fail
    /// the search.
    pub async fn search(
        &self,
        scope: &MemoryScope,
        query: &str,
        limit: usize,
        memory_type: Option<MemoryType>,
        session_id: Option<String>,
    ) -> Result<Vec<ScoredFragment>> {
        let query_vector = self.embeddings.embed(query).await?;
        let filter = PointFilter::for_scope(scope)
            .with_memory_type(memory_type.map(|t| t.as_str().to_string()))
            .with_session(session_id);
        let hits = self.vectors.query(&filter, &query_vector, limit).await?;

        let ids: Vec<String> = hits.iter().map(|hit| hit.id.clone()).collect();
        let mut by_id: HashMap<String, MemoryFragment> = self
            .meta
            .get_fragments(&ids)
            .await?
            .into_iter()
            .map(|f| (f.id.clone(), f))
            .collect();

        // A hit missing from the metadata store is a rolled-back write or a
        // concurrent delete; drop it silently.
        let results: Vec<ScoredFragment> = hits
            .into_iter()
            .filter_map(|hit| {
                by_id.remove(&hit.id).map(|fragment| ScoredFragment {
                    fragment,
                    score: hit.score,
                })
            })
            .collect();

        let surviving: Vec<String> = results.iter().map(|r| r.fragment.id.clone()).collect();
        if let Err(e) = self.meta.increment_hit_counts(&surviving).await {
            warn!(error = %e, "hit-count update failed after search");
        }

        debug!(
            user = %scope.user_id,
            results = results.len(),
            "search completed"
        );
        Ok(results)
    }

    /// Update a fragment. Returns `None` when the id does not exist inside
    /// the caller's scope.
    ///
    /// # Errors
    ///
    /// Storage errors; embedding or vector-write errors when `content`
    /// changed.
    pub async fn update(
        &self,
        scope: &MemoryScope,
        fragment_id: &str,
        fields: UpdateFields,
    ) -> Result<Option<MemoryFragment>> {
        let Some(existing) = self.meta.get_fragment(fragment_id).await? else {
            return Ok(None);
        };
        if existing.scope() != *scope {
            return Ok(None);
        }

        let content_changed = fields.content.clone();
        let patch = FragmentPatch {
            content: fields.content,
            tags: fields.tags,
            importance: fields.importance,
            metadata: fields.metadata,
        };
        if !self.meta.update_fragment(fragment_id, patch).await? {
            return Ok(None);
        }

        if let Some(content) = content_changed {
            let vector = self.embeddings.embed(&content).await?;
            self.vectors
                .update_content(fragment_id, vector, &content)
                .await
                .map_err(|e| EngramaError::VectorWriteFailed(e.to_string()))?;
        }

        info!(id = %fragment_id, user = %scope.user_id, "memory updated");
        self.meta.get_fragment(fragment_id).await
    }

    /// Delete a fragment. The metadata row goes first; a failing vector
    /// delete is logged but does not fail the call — the authority already
    /// reflects the intent and search masks the orphan point.
    ///
    /// # Errors
    ///
    /// Metadata storage errors only.
    pub async fn delete(&self, scope: &MemoryScope, fragment_id: &str) -> Result<bool> {
        let Some(existing) = self.meta.get_fragment(fragment_id).await? else {
            return Ok(false);
        };
        if existing.scope() != *scope {
            return Ok(false);
        }

        if !self.meta.delete_fragment(fragment_id).await? {
            return Ok(false);
        }

        if let Err(e) = self.vectors.delete_points(&[fragment_id.to_string()]).await {
            warn!(id = %fragment_id, error = %e, "vector delete failed after metadata delete");
        }

        info!(id = %fragment_id, user = %scope.user_id, "memory deleted");
        Ok(true)
    }

    /// List fragments in a scope, newest first, ties broken by id.
    ///
    /// # Errors
    ///
    /// Vector-scroll or hydration failures.
    pub async fn list(
        &self,
        scope: &MemoryScope,
        memory_type: Option<MemoryType>,
        limit: usize,
    ) -> Result<Vec<MemoryFragment>> {
        let filter = PointFilter::for_scope(scope)
            .with_memory_type(memory_type.map(|t| t.as_str().to_string()));
        let mut fragments = self.hydrate_scroll(&filter, limit).await?;
        fragments.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(fragments)
    }

    /// Session history, oldest first, ties broken by id.
    ///
    /// # Errors
    ///
    /// Vector-scroll or hydration failures.
    pub async fn history(
        &self,
        scope: &MemoryScope,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryFragment>> {
        let filter = PointFilter::for_scope(scope).with_session(Some(session_id.to_string()));
        let mut fragments = self.hydrate_scroll(&filter, limit).await?;
        fragments.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(fragments)
    }

    /// Session history as chat-shaped `{role, content}` pairs.
    ///
    /// # Errors
    ///
    /// Same as [`MemoryEngine::history`].
    pub async fn history_for_llm(
        &self,
        scope: &MemoryScope,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        let history = self.history(scope, session_id, limit).await?;
        Ok(history
            .into_iter()
            .map(|fragment| ChatMessage {
                role: fragment
                    .role
                    .map_or_else(|| "user".to_string(), |r| r.as_str().to_string()),
                content: fragment.content,
            })
            .collect())
    }

    /// Per-user counters, computed entirely from the metadata store.
    ///
    /// # Errors
    ///
    /// Metadata storage errors.
    pub async fn stats(&self, scope: &MemoryScope) -> Result<UserStats> {
        self.meta.user_stats(scope).await
    }

    async fn hydrate_scroll(
        &self,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<MemoryFragment>> {
        let points = self.vectors.scroll(filter, limit).await?;
        let ids: Vec<String> = points.into_iter().map(|p| p.id).collect();
        self.meta.get_fragments(&ids).await
    }

    async fn compensate(&self, fragment_id: &str) {
        if let Err(e) = self.meta.delete_fragment(fragment_id).await {
            error!(id = %fragment_id, error = %e, "compensation delete failed; orphan metadata row remains");
        }
    }
}

fn payload_for(fragment: &MemoryFragment) -> PointPayload {
    PointPayload {
        tenant_id: fragment.tenant_id.clone(),
        project_id: fragment.project_id.clone(),
        user_id: fragment.user_id.clone(),
        memory_type: fragment.memory_type.as_str().to_string(),
        session_id: fragment.session_id.clone(),
        content: fragment.content.clone(),
        created_at: fragment.created_at.to_rfc3339(),
    }
}
