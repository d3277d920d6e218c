//! Channel-management routes
//!
//! Tenant, project, and API-key administration under `/v1/channels`,
//! gated by the admin token in the admission middleware. Key listings
//! never contain secret or hash material.
//!
//! - `POST   /v1/channels/tenants`        — register tenant
//! - `GET    /v1/channels/tenants`        — list tenants
//! - `DELETE /v1/channels/tenants/{id}`   — delete tenant (cascade)
//! - `POST   /v1/channels/projects`       — create project
//! - `GET    /v1/channels/projects`       — list projects
//! - `DELETE /v1/channels/projects/{id}`  — delete project (cascade)
//! - `POST   /v1/channels/api-keys`       — mint a key (secret shown once)
//! - `GET    /v1/channels/api-keys`       — list keys for a project
//! - `DELETE /v1/channels/api-keys/{id}`  — revoke a key

use axum::extract::{Path, Query, State};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use engrama_core::limits::MAX_NAME_LENGTH;
use engrama_core::{ApiKeyListing, EngramaError};

use crate::error::ApiError;
use crate::state::AppState;

/// Build the channel-management router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/channels/tenants",
            post(register_tenant).get(list_tenants),
        )
        .route("/v1/channels/tenants/:tenant_id", axum::routing::delete(delete_tenant))
        .route(
            "/v1/channels/projects",
            post(create_project).get(list_projects),
        )
        .route(
            "/v1/channels/projects/:project_id",
            axum::routing::delete(delete_project),
        )
        .route(
            "/v1/channels/api-keys",
            post(generate_api_key).get(list_api_keys),
        )
        .route(
            "/v1/channels/api-keys/:key_id",
            axum::routing::delete(revoke_api_key),
        )
}

// ----------------------------------------------------------
// Request / response shapes
// ----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterTenantRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    tenant_id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateApiKeyRequest {
    tenant_id: String,
    project_id: String,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TenantScopedParams {
    tenant_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ProjectScopedParams {
    project_id: String,
}

#[derive(Debug, Serialize)]
pub struct TenantResponse {
    id: String,
    name: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    id: String,
    tenant_id: String,
    name: String,
    created_at: DateTime<Utc>,
}

/// Minting response — the only response that ever carries the secret.
#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    key: String,
    key_id: String,
    tenant_id: String,
    project_id: String,
    user_id: Option<String>,
    created_at: DateTime<Utc>,
}

fn validate_name(name: &str) -> Result<(), EngramaError> {
    if name.trim().is_empty() {
        return Err(EngramaError::Validation(
            "name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(EngramaError::Validation(format!(
            "name exceeds {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}

// ----------------------------------------------------------
// Handlers
// ----------------------------------------------------------

async fn register_tenant(
    State(state): State<AppState>,
    Json(body): Json<RegisterTenantRequest>,
) -> Result<Json<TenantResponse>, ApiError> {
    validate_name(&body.name)?;
    let tenant = state.channels.register_tenant(&body.name).await?;
    Ok(Json(TenantResponse {
        id: tenant.id,
        name: tenant.name,
        created_at: tenant.created_at,
    }))
}

async fn list_tenants(
    State(state): State<AppState>,
) -> Result<Json<Vec<TenantResponse>>, ApiError> {
    let tenants = state.channels.list_tenants().await?;
    Ok(Json(
        tenants
            .into_iter()
            .map(|t| TenantResponse {
                id: t.id,
                name: t.name,
                created_at: t.created_at,
            })
            .collect(),
    ))
}

async fn delete_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deleted = state.channels.delete_tenant(&tenant_id).await?;
    if deleted {
        Ok(Json(json!({"detail": "deleted", "id": tenant_id})))
    } else {
        Err(EngramaError::NotFound("tenant not found".to_string()).into())
    }
}

async fn create_project(
    State(state): State<AppState>,
    Json(body): Json<CreateProjectRequest>,
) -> Result<Json<ProjectResponse>, ApiError> {
    validate_name(&body.name)?;
    let project = state
        .channels
        .create_project(&body.tenant_id, &body.name)
        .await?;
    Ok(Json(ProjectResponse {
        id: project.id,
        tenant_id: project.tenant_id,
        name: project.name,
        created_at: project.created_at,
    }))
}

async fn list_projects(
    State(state): State<AppState>,
    Query(params): Query<TenantScopedParams>,
) -> Result<Json<Vec<ProjectResponse>>, ApiError> {
    let projects = state.channels.list_projects(&params.tenant_id).await?;
    Ok(Json(
        projects
            .into_iter()
            .map(|p| ProjectResponse {
                id: p.id,
                tenant_id: p.tenant_id,
                name: p.name,
                created_at: p.created_at,
            })
            .collect(),
    ))
}

async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(params): Query<TenantScopedParams>,
) -> Result<Json<Value>, ApiError> {
    let deleted = state
        .channels
        .delete_project(&project_id, &params.tenant_id)
        .await?;
    if deleted {
        Ok(Json(json!({"detail": "deleted", "id": project_id})))
    } else {
        Err(EngramaError::NotFound("project not found".to_string()).into())
    }
}

async fn generate_api_key(
    State(state): State<AppState>,
    Json(body): Json<GenerateApiKeyRequest>,
) -> Result<Json<ApiKeyResponse>, ApiError> {
    let minted = state
        .channels
        .generate_api_key(&body.tenant_id, &body.project_id, body.user_id)
        .await?;
    Ok(Json(ApiKeyResponse {
        key: minted.key,
        key_id: minted.key_id,
        tenant_id: minted.tenant_id,
        project_id: minted.project_id,
        user_id: minted.user_id,
        created_at: minted.created_at,
    }))
}

async fn list_api_keys(
    State(state): State<AppState>,
    Query(params): Query<ProjectScopedParams>,
) -> Result<Json<Vec<ApiKeyListing>>, ApiError> {
    let keys = state.channels.list_api_keys(&params.project_id).await?;
    Ok(Json(keys))
}

async fn revoke_api_key(
    State(state): State<AppState>,
    Path(key_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let revoked = state.channels.revoke_api_key(&key_id).await?;
    Ok(Json(json!({"key_id": key_id, "revoked": revoked})))
}
