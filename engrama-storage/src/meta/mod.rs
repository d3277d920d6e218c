//! Metadata store abstraction
//!
//! The trait carries exactly the operations the memory engine and the
//! channel manager need; the backing engine is configuration. Fragments are
//! the authoritative record here — the vector index is an index, not a
//! ground-truth count.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use engrama_core::{ApiKey, ApiKeyListing, MemoryFragment, MemoryScope, Project, Result, Tenant};

mod sqlite;

pub use sqlite::SqliteMetaStore;

/// Partial update for a memory fragment.
///
/// The field set here is the whitelist: `content`, `tags`, `importance`,
/// `metadata`. Anything else never reaches the store — the request surface
/// rejects it by name before a statement is built.
#[derive(Debug, Clone, Default)]
pub struct FragmentPatch {
    /// New content (triggers re-vectorization upstream)
    pub content: Option<String>,
    /// Replacement tag list
    pub tags: Option<Vec<String>>,
    /// New importance weight
    pub importance: Option<f64>,
    /// Replacement structured payload
    pub metadata: Option<Value>,
}

impl FragmentPatch {
    /// True when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.tags.is_none()
            && self.importance.is_none()
            && self.metadata.is_none()
    }
}

/// Per-user memory counters, computed from the metadata store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserStats {
    /// Total fragments in the scope
    pub total: u64,
    /// Fragment counts keyed by memory type name
    pub by_type: BTreeMap<String, u64>,
}

/// Authoritative relational store of channel identity and fragments.
///
/// Backends must serialize writes to a single fragment id (row-level
/// locking); writes to distinct ids are unordered.
#[async_trait]
pub trait MetaStore: Send + Sync {
    // ---- tenants ----

    /// Persist a new tenant. Duplicate names are rejected.
    async fn create_tenant(&self, tenant: Tenant) -> Result<()>;

    /// Fetch a tenant by id.
    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>>;

    /// Fetch a tenant by its unique name.
    async fn find_tenant_by_name(&self, name: &str) -> Result<Option<Tenant>>;

    /// All tenants, newest first.
    async fn list_tenants(&self) -> Result<Vec<Tenant>>;

    /// Cascade-delete a tenant: deactivate its keys, delete its projects,
    /// delete the tenant row, all in one transaction. Returns false when
    /// the tenant does not exist.
    async fn delete_tenant(&self, tenant_id: &str) -> Result<bool>;

    // ---- projects ----

    /// Persist a new project. Duplicate `(tenant_id, name)` pairs are
    /// rejected.
    async fn create_project(&self, project: Project) -> Result<()>;

    /// Fetch a project by id.
    async fn get_project(&self, project_id: &str) -> Result<Option<Project>>;

    /// Fetch a project by name within a tenant.
    async fn find_project_by_name(&self, tenant_id: &str, name: &str) -> Result<Option<Project>>;

    /// Projects of a tenant, newest first.
    async fn list_projects(&self, tenant_id: &str) -> Result<Vec<Project>>;

    /// Cascade-delete a project after verifying it belongs to the tenant:
    /// deactivate its keys, delete the project row. Returns false when the
    /// project is missing or owned by another tenant.
    async fn delete_project(&self, project_id: &str, tenant_id: &str) -> Result<bool>;

    // ---- api keys ----

    /// Persist a freshly minted key record (hash only, never the secret).
    async fn insert_api_key(&self, key: ApiKey) -> Result<()>;

    /// Look up an *active* key by secret hash — the sole authentication
    /// index.
    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>>;

    /// Deactivate a key by public handle. Idempotent: returns true only
    /// when an active key was flipped.
    async fn revoke_api_key(&self, key_id: &str) -> Result<bool>;

    /// Keys under a project, newest first; listings carry no secret or
    /// hash.
    async fn list_api_keys(&self, project_id: &str) -> Result<Vec<ApiKeyListing>>;

    // ---- memory fragments ----

    /// Persist a new fragment.
    async fn insert_fragment(&self, fragment: MemoryFragment) -> Result<()>;

    /// Fetch one fragment by id.
    async fn get_fragment(&self, fragment_id: &str) -> Result<Option<MemoryFragment>>;

    /// Bulk hydration by id list; ids without a row are simply absent from
    /// the result.
    async fn get_fragments(&self, fragment_ids: &[String]) -> Result<Vec<MemoryFragment>>;

    /// Apply a whitelisted patch and advance `updated_at`. Returns false
    /// when the row does not exist.
    async fn update_fragment(&self, fragment_id: &str, patch: FragmentPatch) -> Result<bool>;

    /// Delete a fragment row. Returns false when no row was deleted.
    async fn delete_fragment(&self, fragment_id: &str) -> Result<bool>;

    /// Batch hit-count increment; a single statement, best-effort at the
    /// call site.
    async fn increment_hit_counts(&self, fragment_ids: &[String]) -> Result<()>;

    /// Count fragments in a scope, total and by type.
    async fn user_stats(&self, scope: &MemoryScope) -> Result<UserStats>;
}
