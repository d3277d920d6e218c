//! # Channel management for Engrama
//!
//! Lifecycle of the identity hierarchy: tenant → project → API key,
//! optionally bound to an end user. Secrets are hashed at rest — minting
//! returns the secret exactly once, verification looks the hash up, and
//! nothing here ever logs or lists secret material.
//!
//! Deletes cascade: removing a project soft-revokes its keys; removing a
//! tenant does the same transitively and clears the tenant's vector data
//! best-effort (inactive keys make it unreachable regardless).

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use engrama_core::{
    ApiKey, ApiKeyListing, EngramaError, MintedApiKey, Project, Result, Tenant,
};
use engrama_storage::meta::MetaStore;
use engrama_storage::vector::VectorIndex;

/// Prefix carried by every issued secret
const KEY_PREFIX: &str = "eng";

/// Length of the public key handle (a prefix of the secret)
const KEY_ID_LEN: usize = 12;

/// Hex SHA-256 of a key secret — the only form that is ever persisted.
#[must_use]
pub fn hash_key(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn mint_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{KEY_PREFIX}_{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Manages tenants, projects, and API keys.
pub struct ChannelManager {
    meta: Arc<dyn MetaStore>,
    vectors: Arc<dyn VectorIndex>,
}

impl ChannelManager {
    /// Compose a manager over the metadata store and the vector index
    /// (the latter only for cascade cleanup).
    #[must_use]
    pub fn new(meta: Arc<dyn MetaStore>, vectors: Arc<dyn VectorIndex>) -> Self {
        Self { meta, vectors }
    }

    // ---- tenants ----

    /// Register a new tenant. Names are unique across all tenants.
    ///
    /// # Errors
    ///
    /// [`EngramaError::BadRequest`] on a duplicate name; storage errors
    /// otherwise.
    pub async fn register_tenant(&self, name: &str) -> Result<Tenant> {
        if self.meta.find_tenant_by_name(name).await?.is_some() {
            return Err(EngramaError::BadRequest(format!(
                "tenant name already exists: {name}"
            )));
        }
        let tenant = Tenant::new(name);
        self.meta.create_tenant(tenant.clone()).await?;
        info!(id = %tenant.id, name = %tenant.name, "tenant registered");
        Ok(tenant)
    }

    /// Fetch a tenant.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>> {
        self.meta.get_tenant(tenant_id).await
    }

    /// All tenants, newest first.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        self.meta.list_tenants().await
    }

    /// Delete a tenant and everything under it. Keys stop authenticating,
    /// projects disappear, and the tenant's vector points are purged
    /// best-effort per project.
    ///
    /// # Errors
    ///
    /// Storage errors. Vector cleanup failures are logged, not fatal.
    pub async fn delete_tenant(&self, tenant_id: &str) -> Result<bool> {
        let projects = self.meta.list_projects(tenant_id).await?;
        let deleted = self.meta.delete_tenant(tenant_id).await?;
        if deleted {
            for project in &projects {
                if let Err(e) = self.vectors.delete_by_scope(tenant_id, &project.id).await {
                    warn!(
                        tenant_id,
                        project_id = %project.id,
                        error = %e,
                        "vector cleanup failed during tenant delete"
                    );
                }
            }
            info!(id = %tenant_id, "tenant deleted");
        }
        Ok(deleted)
    }

    // ---- projects ----

    /// Create a project under a tenant. `(tenant, name)` is unique.
    ///
    /// # Errors
    ///
    /// [`EngramaError::NotFound`] when the tenant does not exist;
    /// [`EngramaError::BadRequest`] on a duplicate name.
    pub async fn create_project(&self, tenant_id: &str, name: &str) -> Result<Project> {
        if self.meta.get_tenant(tenant_id).await?.is_none() {
            return Err(EngramaError::NotFound(format!(
                "tenant not found: {tenant_id}"
            )));
        }
        if self
            .meta
            .find_project_by_name(tenant_id, name)
            .await?
            .is_some()
        {
            return Err(EngramaError::BadRequest(format!(
                "project name already exists in tenant: {name}"
            )));
        }
        let project = Project::new(tenant_id, name);
        self.meta.create_project(project.clone()).await?;
        info!(id = %project.id, tenant = %tenant_id, name = %project.name, "project created");
        Ok(project)
    }

    /// Fetch a project.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        self.meta.get_project(project_id).await
    }

    /// Projects of a tenant, newest first.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn list_projects(&self, tenant_id: &str) -> Result<Vec<Project>> {
        self.meta.list_projects(tenant_id).await
    }

    /// Delete a project after verifying tenant ownership. Its keys stop
    /// authenticating; its vector points are purged best-effort.
    ///
    /// # Errors
    ///
    /// Storage errors. Vector cleanup failures are logged, not fatal.
    pub async fn delete_project(&self, project_id: &str, tenant_id: &str) -> Result<bool> {
        let deleted = self.meta.delete_project(project_id, tenant_id).await?;
        if deleted {
            if let Err(e) = self.vectors.delete_by_scope(tenant_id, project_id).await {
                warn!(
                    tenant_id,
                    project_id,
                    error = %e,
                    "vector cleanup failed during project delete"
                );
            }
            info!(id = %project_id, tenant = %tenant_id, "project deleted");
        }
        Ok(deleted)
    }

    // ---- api keys ----

    /// Mint an API key for `tenant + project`, optionally bound to an end
    /// user. The returned secret is shown exactly once; only its SHA-256
    /// is stored.
    ///
    /// # Errors
    ///
    /// [`EngramaError::NotFound`] when the tenant is missing or the
    /// project is missing / owned by another tenant.
    pub async fn generate_api_key(
        &self,
        tenant_id: &str,
        project_id: &str,
        user_id: Option<String>,
    ) -> Result<MintedApiKey> {
        if self.meta.get_tenant(tenant_id).await?.is_none() {
            return Err(EngramaError::NotFound(format!(
                "tenant not found: {tenant_id}"
            )));
        }
        match self.meta.get_project(project_id).await? {
            Some(project) if project.tenant_id == tenant_id => {}
            _ => {
                return Err(EngramaError::NotFound(format!(
                    "project not found or not owned by tenant: {project_id}"
                )));
            }
        }

        let secret = mint_secret();
        let key_id: String = secret.chars().take(KEY_ID_LEN).collect();
        let record = ApiKey {
            key_id: key_id.clone(),
            key_hash: hash_key(&secret),
            tenant_id: tenant_id.to_string(),
            project_id: project_id.to_string(),
            user_id: user_id.clone(),
            created_at: chrono::Utc::now(),
            is_active: true,
        };
        self.meta.insert_api_key(record.clone()).await?;

        match &user_id {
            Some(user) => info!(
                tenant = %tenant_id, project = %project_id, user = %user,
                "user-scoped API key minted"
            ),
            None => info!(
                tenant = %tenant_id, project = %project_id,
                "project-scoped API key minted"
            ),
        }

        Ok(MintedApiKey {
            key: secret,
            key_id,
            tenant_id: record.tenant_id,
            project_id: record.project_id,
            user_id,
            created_at: record.created_at,
        })
    }

    /// Authenticate a secret. Returns the key record only when it is
    /// active and its stored hash matches.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn verify_api_key(&self, secret: &str) -> Result<Option<ApiKey>> {
        self.meta.find_api_key_by_hash(&hash_key(secret)).await
    }

    /// Deactivate a key by its public handle. Idempotent.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn revoke_api_key(&self, key_id: &str) -> Result<bool> {
        let revoked = self.meta.revoke_api_key(key_id).await?;
        if revoked {
            info!(key_id, "API key revoked");
        }
        Ok(revoked)
    }

    /// Keys under a project. Listings carry the handle and scope only.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn list_api_keys(&self, project_id: &str) -> Result<Vec<ApiKeyListing>> {
        self.meta.list_api_keys(project_id).await
    }
}
