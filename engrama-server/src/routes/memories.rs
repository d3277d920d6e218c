//! Memory routes
//!
//! - `POST   /v1/memories`          — add a fragment
//! - `POST   /v1/memories/search`   — semantic search
//! - `GET    /v1/memories`          — list
//! - `PUT    /v1/memories/{id}`     — partial update
//! - `DELETE /v1/memories/{id}`     — delete
//! - `GET    /v1/sessions/{sid}/history` — session history
//! - `GET    /v1/users/me/stats`    — stats for the key's bound user
//! - `GET    /v1/users/{uid}/stats` — stats for a user

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use engrama_core::limits::{
    DEFAULT_LIST_LIMIT, DEFAULT_SEARCH_LIMIT, MAX_CONTENT_LENGTH, MAX_LIST_LIMIT,
    MAX_SEARCH_LIMIT, MAX_TAGS_COUNT,
};
use engrama_core::scope::resolve_user_id;
use engrama_core::{EngramaError, MemoryFragment, MemoryScope, MemoryType, Role};
use engrama_memory::{NewFragment, ScoredFragment, UpdateFields};

use crate::error::ApiError;
use crate::middleware::AuthContext;
use crate::state::AppState;

/// Build the memory router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/memories", post(add_memory).get(list_memories))
        .route("/v1/memories/search", post(search_memories))
        .route(
            "/v1/memories/:fragment_id",
            put(update_memory).delete(delete_memory),
        )
        .route("/v1/sessions/:session_id/history", get(session_history))
        // Static route must not be shadowed by the parameterized one below
        .route("/v1/users/me/stats", get(my_stats))
        .route("/v1/users/:user_id/stats", get(user_stats))
}

// ----------------------------------------------------------
// Request / response shapes
// ----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AddMemoryRequest {
    #[serde(default)]
    user_id: Option<String>,
    content: String,
    memory_type: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    importance: Option<f64>,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct SearchMemoryRequest {
    #[serde(default)]
    user_id: Option<String>,
    query: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    memory_type: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListMemoriesParams {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    memory_type: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct UserParam {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

/// One fragment on the wire, with an optional search score.
#[derive(Debug, Serialize)]
pub struct MemoryResponse {
    id: String,
    user_id: String,
    content: String,
    memory_type: MemoryType,
    role: Option<Role>,
    session_id: Option<String>,
    tags: Vec<String>,
    importance: f64,
    hit_count: u64,
    metadata: Option<Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f32>,
}

impl From<MemoryFragment> for MemoryResponse {
    fn from(fragment: MemoryFragment) -> Self {
        Self {
            id: fragment.id,
            user_id: fragment.user_id,
            content: fragment.content,
            memory_type: fragment.memory_type,
            role: fragment.role,
            session_id: fragment.session_id,
            tags: fragment.tags,
            importance: fragment.importance,
            hit_count: fragment.hit_count,
            metadata: fragment.metadata,
            created_at: fragment.created_at,
            updated_at: fragment.updated_at,
            score: None,
        }
    }
}

impl From<ScoredFragment> for MemoryResponse {
    fn from(scored: ScoredFragment) -> Self {
        let mut response = Self::from(scored.fragment);
        response.score = Some(scored.score);
        response
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResultResponse {
    results: Vec<MemoryResponse>,
    total: usize,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    session_id: String,
    messages: Vec<MemoryResponse>,
    total: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    user_id: String,
    total_memories: u64,
    by_type: BTreeMap<String, u64>,
}

// ----------------------------------------------------------
// Validation
// ----------------------------------------------------------

fn validate_content(content: &str) -> Result<(), EngramaError> {
    if content.trim().is_empty() {
        return Err(EngramaError::Validation(
            "content must not be empty".to_string(),
        ));
    }
    if content.chars().count() > MAX_CONTENT_LENGTH {
        return Err(EngramaError::Validation(format!(
            "content exceeds {MAX_CONTENT_LENGTH} characters"
        )));
    }
    Ok(())
}

fn validate_tags(tags: &[String]) -> Result<(), EngramaError> {
    if tags.len() > MAX_TAGS_COUNT {
        return Err(EngramaError::Validation(format!(
            "at most {MAX_TAGS_COUNT} tags are allowed"
        )));
    }
    Ok(())
}

fn validate_importance(importance: f64) -> Result<(), EngramaError> {
    if !(0.0..=1.0).contains(&importance) {
        return Err(EngramaError::Validation(
            "importance must be within [0, 1]".to_string(),
        ));
    }
    Ok(())
}

fn clamp_limit(requested: Option<usize>, default: usize, max: usize) -> usize {
    requested.unwrap_or(default).clamp(1, max)
}

fn scope_for(auth: &AuthContext, passed: Option<&str>) -> Result<MemoryScope, EngramaError> {
    let user_id = resolve_user_id(auth.bound_user_id.as_deref(), passed)?;
    Ok(MemoryScope::new(
        auth.tenant_id.clone(),
        auth.project_id.clone(),
        user_id,
    ))
}

fn parse_memory_type(raw: Option<&str>) -> Result<Option<MemoryType>, EngramaError> {
    raw.filter(|s| !s.is_empty()).map(MemoryType::parse).transpose()
}

// ----------------------------------------------------------
// Handlers
// ----------------------------------------------------------

async fn add_memory(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<AddMemoryRequest>,
) -> Result<Json<MemoryResponse>, ApiError> {
    validate_content(&body.content)?;
    let tags = body.tags.unwrap_or_default();
    validate_tags(&tags)?;
    let importance = body.importance.unwrap_or(0.0);
    validate_importance(importance)?;

    let memory_type = MemoryType::parse(&body.memory_type)?;
    let role = body.role.as_deref().map(Role::parse).transpose()?;
    let scope = scope_for(&auth, body.user_id.as_deref())?;

    let fragment = state
        .engine
        .add(
            &scope,
            NewFragment {
                content: body.content,
                memory_type,
                role,
                session_id: body.session_id,
                tags,
                importance,
                metadata: body.metadata,
            },
        )
        .await?;
    Ok(Json(fragment.into()))
}

async fn search_memories(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<SearchMemoryRequest>,
) -> Result<Json<SearchResultResponse>, ApiError> {
    if body.query.trim().is_empty() {
        return Err(EngramaError::Validation("query must not be empty".to_string()).into());
    }
    let scope = scope_for(&auth, body.user_id.as_deref())?;
    let limit = clamp_limit(body.limit, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT);
    let memory_type = parse_memory_type(body.memory_type.as_deref())?;

    let results = state
        .engine
        .search(&scope, &body.query, limit, memory_type, body.session_id)
        .await?;
    let results: Vec<MemoryResponse> = results.into_iter().map(Into::into).collect();
    let total = results.len();
    Ok(Json(SearchResultResponse { results, total }))
}

async fn list_memories(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<ListMemoriesParams>,
) -> Result<Json<Vec<MemoryResponse>>, ApiError> {
    let scope = scope_for(&auth, params.user_id.as_deref())?;
    let limit = clamp_limit(params.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);
    let memory_type = parse_memory_type(params.memory_type.as_deref())?;

    let fragments = state.engine.list(&scope, memory_type, limit).await?;
    Ok(Json(fragments.into_iter().map(Into::into).collect()))
}

/// Fields accepted by `PUT /v1/memories/{id}`. Any other name in the body
/// is rejected before a patch is built.
const UPDATABLE_FIELDS: &[&str] = &["user_id", "content", "tags", "importance", "metadata"];

fn parse_update_body(body: &Value) -> Result<(Option<String>, UpdateFields), EngramaError> {
    let Some(object) = body.as_object() else {
        return Err(EngramaError::Validation(
            "request body must be a JSON object".to_string(),
        ));
    };
    for key in object.keys() {
        if !UPDATABLE_FIELDS.contains(&key.as_str()) {
            return Err(EngramaError::BadRequest(format!(
                "unsupported update field: {key}"
            )));
        }
    }

    let user_id = match object.get("user_id") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            return Err(EngramaError::Validation(
                "user_id must be a string".to_string(),
            ))
        }
    };
    let content = match object.get("content") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            validate_content(s)?;
            Some(s.clone())
        }
        Some(_) => {
            return Err(EngramaError::Validation(
                "content must be a string".to_string(),
            ))
        }
    };
    let tags = match object.get("tags") {
        None | Some(Value::Null) => None,
        Some(value) => {
            let tags: Vec<String> = serde_json::from_value(value.clone()).map_err(|_| {
                EngramaError::Validation("tags must be an array of strings".to_string())
            })?;
            validate_tags(&tags)?;
            Some(tags)
        }
    };
    let importance = match object.get("importance") {
        None | Some(Value::Null) => None,
        Some(value) => {
            let importance = value.as_f64().ok_or_else(|| {
                EngramaError::Validation("importance must be a number".to_string())
            })?;
            validate_importance(importance)?;
            Some(importance)
        }
    };
    let metadata = object.get("metadata").filter(|v| !v.is_null()).cloned();

    Ok((
        user_id,
        UpdateFields {
            content,
            tags,
            importance,
            metadata,
        },
    ))
}

async fn update_memory(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(fragment_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<MemoryResponse>, ApiError> {
    let (user_id, fields) = parse_update_body(&body)?;
    let scope = scope_for(&auth, user_id.as_deref())?;

    let updated = state.engine.update(&scope, &fragment_id, fields).await?;
    match updated {
        Some(fragment) => Ok(Json(fragment.into())),
        None => Err(EngramaError::NotFound("memory fragment not found".to_string()).into()),
    }
}

async fn delete_memory(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(fragment_id): Path<String>,
    Query(params): Query<UserParam>,
) -> Result<Json<Value>, ApiError> {
    let scope = scope_for(&auth, params.user_id.as_deref())?;
    let deleted = state.engine.delete(&scope, &fragment_id).await?;
    if deleted {
        Ok(Json(serde_json::json!({
            "detail": "deleted",
            "id": fragment_id,
        })))
    } else {
        Err(EngramaError::NotFound("memory fragment not found".to_string()).into())
    }
}

async fn session_history(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(session_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let scope = scope_for(&auth, params.user_id.as_deref())?;
    let limit = clamp_limit(params.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);

    let messages = state.engine.history(&scope, &session_id, limit).await?;
    let messages: Vec<MemoryResponse> = messages.into_iter().map(Into::into).collect();
    let total = messages.len();
    Ok(Json(HistoryResponse {
        session_id,
        messages,
        total,
    }))
}

async fn my_stats(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<StatsResponse>, ApiError> {
    // A project-scoped key has no "me" to report on.
    let Some(bound) = auth.bound_user_id.clone() else {
        return Err(EngramaError::BadRequest(
            "a user-scoped API key is required for /users/me/stats".to_string(),
        )
        .into());
    };
    let scope = MemoryScope::new(auth.tenant_id, auth.project_id, bound.clone());
    let stats = state.engine.stats(&scope).await?;
    Ok(Json(StatsResponse {
        user_id: bound,
        total_memories: stats.total,
        by_type: stats.by_type,
    }))
}

async fn user_stats(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
) -> Result<Json<StatsResponse>, ApiError> {
    let scope = scope_for(&auth, Some(user_id.as_str()))?;
    let stats = state.engine.stats(&scope).await?;
    Ok(Json(StatsResponse {
        user_id: scope.user_id,
        total_memories: stats.total,
        by_type: stats.by_type,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_update_field_is_rejected_by_name() {
        let err = parse_update_body(&json!({"hit_count": 99})).unwrap_err();
        assert_eq!(err.kind(), "bad_request");
        assert!(err.to_string().contains("hit_count"));
    }

    #[test]
    fn update_body_parses_whitelisted_fields() {
        let (user_id, fields) = parse_update_body(&json!({
            "user_id": "alice",
            "content": "new text",
            "tags": ["a", "b"],
            "importance": 0.5,
        }))
        .unwrap();
        assert_eq!(user_id.as_deref(), Some("alice"));
        assert_eq!(fields.content.as_deref(), Some("new text"));
        assert_eq!(fields.tags.as_deref(), Some(&["a".to_string(), "b".to_string()][..]));
        assert_eq!(fields.importance, Some(0.5));
        assert!(fields.metadata.is_none());
    }

    #[test]
    fn update_body_importance_out_of_range() {
        let err = parse_update_body(&json!({"importance": 1.5})).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn limits_are_clamped() {
        assert_eq!(clamp_limit(None, 10, 100), 10);
        assert_eq!(clamp_limit(Some(0), 10, 100), 1);
        assert_eq!(clamp_limit(Some(5000), 100, 1000), 1000);
    }

    #[test]
    fn content_bounds() {
        assert!(validate_content("ok").is_ok());
        assert!(validate_content("").is_err());
        let long = "x".repeat(MAX_CONTENT_LENGTH + 1);
        assert_eq!(
            validate_content(&long).unwrap_err().kind(),
            "validation_error"
        );
    }
}
