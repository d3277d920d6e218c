//! HTTP integration tests
//!
//! Drives the assembled router with `tower::ServiceExt::oneshot` against
//! an in-memory metadata store, an in-memory vector index (with injectable
//! failures), and deterministic mock embeddings. Covers channel
//! provisioning, scope enforcement, dual-store compensation, hydration
//! tolerance, cascades, and the rate-limit boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use engrama_core::Result;
use engrama_memory::{MemoryEngine, MockEmbeddingProvider};
use engrama_server::{build_app, AppState, EngramaConfig, RateLimiter};
use engrama_storage::meta::{MetaStore, SqliteMetaStore};
use engrama_storage::vector::{
    InMemoryIndex, PointFilter, ScoredPoint, StoredPoint, VectorIndex, VectorPoint,
};
use engrama_tenancy::ChannelManager;

const ADMIN_TOKEN: &str = "admin-secret";

/// In-memory index with injectable upsert failures.
struct FlakyIndex {
    inner: InMemoryIndex,
    fail_upserts: AtomicBool,
}

impl FlakyIndex {
    fn new() -> Self {
        Self {
            inner: InMemoryIndex::new(),
            fail_upserts: AtomicBool::new(false),
        }
    }
}

#[async_trait::async_trait]
impl VectorIndex for FlakyIndex {
    async fn ensure_collection(&self) -> Result<()> {
        self.inner.ensure_collection().await
    }

    async fn upsert(&self, point: VectorPoint) -> Result<()> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(engrama_core::EngramaError::Storage(
                "injected upsert failure".into(),
            ));
        }
        self.inner.upsert(point).await
    }

    async fn update_content(&self, id: &str, vector: Vec<f32>, content: &str) -> Result<()> {
        self.inner.update_content(id, vector, content).await
    }

    async fn query(
        &self,
        filter: &PointFilter,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        self.inner.query(filter, vector, limit).await
    }

    async fn scroll(&self, filter: &PointFilter, limit: usize) -> Result<Vec<StoredPoint>> {
        self.inner.scroll(filter, limit).await
    }

    async fn delete_points(&self, ids: &[String]) -> Result<()> {
        self.inner.delete_points(ids).await
    }

    async fn delete_by_scope(&self, tenant_id: &str, project_id: &str) -> Result<()> {
        self.inner.delete_by_scope(tenant_id, project_id).await
    }
}

struct TestEnv {
    app: Router,
    meta: Arc<SqliteMetaStore>,
    index: Arc<FlakyIndex>,
}

fn test_env(admin_token: Option<&str>, rate_limit: u32) -> TestEnv {
    let meta = Arc::new(SqliteMetaStore::new_in_memory().unwrap());
    let index = Arc::new(FlakyIndex::new());
    let meta_dyn: Arc<dyn MetaStore> = meta.clone();
    let index_dyn: Arc<dyn VectorIndex> = index.clone();

    let engine = Arc::new(MemoryEngine::new(
        Arc::clone(&meta_dyn),
        Arc::clone(&index_dyn),
        Arc::new(MockEmbeddingProvider::default()),
    ));
    let channels = Arc::new(ChannelManager::new(meta_dyn, index_dyn));
    let limiter = Arc::new(RateLimiter::in_process(rate_limit));

    let config = EngramaConfig {
        admin_token: admin_token.map(ToString::to_string),
        rate_limit_per_minute: rate_limit,
        ..EngramaConfig::default()
    };

    let state = AppState {
        engine,
        channels,
        limiter,
        config: Arc::new(config),
    };
    TestEnv {
        app: build_app(state),
        meta,
        index,
    }
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

const ADMIN: &[(&str, &str)] = &[("x-admin-token", ADMIN_TOKEN)];

/// Register tenant + project + project-scoped key; returns
/// `(tenant_id, project_id, api_key)`.
async fn setup_channel(app: &Router) -> (String, String, String) {
    let (status, tenant) = send(
        app,
        "POST",
        "/v1/channels/tenants",
        ADMIN,
        Some(json!({"name": "acme"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let tenant_id = tenant["id"].as_str().unwrap().to_string();

    let (status, project) = send(
        app,
        "POST",
        "/v1/channels/projects",
        ADMIN,
        Some(json!({"tenant_id": tenant_id, "name": "bot"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let project_id = project["id"].as_str().unwrap().to_string();

    let (status, key) = send(
        app,
        "POST",
        "/v1/channels/api-keys",
        ADMIN,
        Some(json!({"tenant_id": tenant_id, "project_id": project_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let api_key = key["key"].as_str().unwrap().to_string();

    (tenant_id, project_id, api_key)
}

// ----------------------------------------------------------
// Public endpoints
// ----------------------------------------------------------

#[tokio::test]
async fn root_and_health_are_public() {
    let env = test_env(Some(ADMIN_TOKEN), 0);

    let (status, body) = send(&env.app, "GET", "/", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["name"].as_str().unwrap().contains("Engrama"));

    let (status, body) = send(&env.app, "GET", "/health", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

// ----------------------------------------------------------
// Admission: admin token
// ----------------------------------------------------------

#[tokio::test]
async fn channel_management_fails_closed_without_configured_token() {
    let env = test_env(None, 0);
    let (status, body) = send(
        &env.app,
        "POST",
        "/v1/channels/tenants",
        &[("x-admin-token", "anything")],
        Some(json!({"name": "acme"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn admin_token_is_required_and_checked() {
    let env = test_env(Some(ADMIN_TOKEN), 0);

    let (status, body) = send(
        &env.app,
        "POST",
        "/v1/channels/tenants",
        &[],
        Some(json!({"name": "acme"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, body) = send(
        &env.app,
        "POST",
        "/v1/channels/tenants",
        &[("x-admin-token", "wrong")],
        Some(json!({"name": "acme"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

// ----------------------------------------------------------
// Admission: API keys
// ----------------------------------------------------------

#[tokio::test]
async fn memory_routes_require_a_valid_key() {
    let env = test_env(Some(ADMIN_TOKEN), 0);

    let (status, _) = send(&env.app, "GET", "/v1/memories?user_id=u1", &[], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &env.app,
        "GET",
        "/v1/memories?user_id=u1",
        &[("x-api-key", "eng_invalid")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

// ----------------------------------------------------------
// Scenario 1: full channel provisioning
// ----------------------------------------------------------

#[tokio::test]
async fn full_channel_provisioning() {
    let env = test_env(Some(ADMIN_TOKEN), 0);
    let (_, project_id, api_key) = setup_channel(&env.app).await;

    assert!(api_key.starts_with("eng_"));

    let (status, keys) = send(
        &env.app,
        "GET",
        &format!("/v1/channels/api-keys?project_id={project_id}"),
        ADMIN,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let keys = keys.as_array().unwrap();
    assert_eq!(keys.len(), 1);
    let listing = keys[0].as_object().unwrap();
    assert_eq!(listing["key_id"].as_str().unwrap().len(), 12);
    assert!(!listing.contains_key("key"));
    assert!(!listing.contains_key("key_hash"));
}

// ----------------------------------------------------------
// Memory CRUD and search
// ----------------------------------------------------------

#[tokio::test]
async fn add_search_list_stats_flow() {
    let env = test_env(Some(ADMIN_TOKEN), 0);
    let (_, _, api_key) = setup_channel(&env.app).await;
    let auth: &[(&str, &str)] = &[("x-api-key", api_key.as_str())];

    for (content, memory_type) in [
        ("birthday is 1990-03-15", "factual"),
        ("prefers quiet rooms", "preference"),
        ("asked about astrology in january", "episodic"),
    ] {
        let (status, _) = send(
            &env.app,
            "POST",
            "/v1/memories",
            auth,
            Some(json!({"user_id": "u1", "content": content, "memory_type": memory_type})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(
        &env.app,
        "POST",
        "/v1/memories/search",
        auth,
        Some(json!({"user_id": "u1", "query": "birthday"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["total"].as_u64().unwrap() > 0);
    assert!(body["results"][0]["score"].is_number());

    let (status, listed) = send(&env.app, "GET", "/v1/memories?user_id=u1", auth, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 3);

    let (status, stats) = send(&env.app, "GET", "/v1/users/u1/stats", auth, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_memories"], 3);
    assert_eq!(stats["by_type"]["factual"], 1);
}

#[tokio::test]
async fn update_and_delete_flow() {
    let env = test_env(Some(ADMIN_TOKEN), 0);
    let (_, _, api_key) = setup_channel(&env.app).await;
    let auth: &[(&str, &str)] = &[("x-api-key", api_key.as_str())];

    let (_, created) = send(
        &env.app,
        "POST",
        "/v1/memories",
        auth,
        Some(json!({"user_id": "u1", "content": "to be edited", "memory_type": "factual"})),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, updated) = send(
        &env.app,
        "PUT",
        &format!("/v1/memories/{id}"),
        auth,
        Some(json!({"user_id": "u1", "content": "edited", "importance": 0.7})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["content"], "edited");
    assert!(updated["updated_at"].as_str().unwrap() > created["updated_at"].as_str().unwrap());

    // Unsupported field is rejected by name
    let (status, body) = send(
        &env.app,
        "PUT",
        &format!("/v1/memories/{id}"),
        auth,
        Some(json!({"user_id": "u1", "hit_count": 42})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, _) = send(
        &env.app,
        "DELETE",
        &format!("/v1/memories/{id}?user_id=u1"),
        auth,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &env.app,
        "DELETE",
        &format!("/v1/memories/{id}?user_id=u1"),
        auth,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listed) = send(&env.app, "GET", "/v1/memories?user_id=u1", auth, None).await;
    assert_eq!(listed.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn validation_limits_are_enforced() {
    let env = test_env(Some(ADMIN_TOKEN), 0);
    let (_, _, api_key) = setup_channel(&env.app).await;
    let auth: &[(&str, &str)] = &[("x-api-key", api_key.as_str())];

    let long_content = "x".repeat(10_001);
    let (status, body) = send(
        &env.app,
        "POST",
        "/v1/memories",
        auth,
        Some(json!({"user_id": "u1", "content": long_content, "memory_type": "factual"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let many_tags: Vec<String> = (0..21).map(|i| format!("tag{i}")).collect();
    let (status, body) = send(
        &env.app,
        "POST",
        "/v1/memories",
        auth,
        Some(json!({"user_id": "u1", "content": "ok", "memory_type": "factual", "tags": many_tags})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = send(
        &env.app,
        "POST",
        "/v1/memories",
        auth,
        Some(json!({"user_id": "u1", "content": "ok", "memory_type": "procedural"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, body) = send(
        &env.app,
        "POST",
        "/v1/memories",
        auth,
        Some(json!({"user_id": "u1", "content": "ok", "memory_type": "factual", "importance": 1.5})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

// ----------------------------------------------------------
// Scenario 2: scope enforcement on a user-scoped key
// ----------------------------------------------------------

#[tokio::test]
async fn user_scoped_key_enforces_its_binding() {
    let env = test_env(Some(ADMIN_TOKEN), 0);
    let (tenant_id, project_id, _) = setup_channel(&env.app).await;

    let (_, minted) = send(
        &env.app,
        "POST",
        "/v1/channels/api-keys",
        ADMIN,
        Some(json!({"tenant_id": tenant_id, "project_id": project_id, "user_id": "alice"})),
    )
    .await;
    let personal_key = minted["key"].as_str().unwrap().to_string();
    let auth: &[(&str, &str)] = &[("x-api-key", personal_key.as_str())];

    // No user_id in the body: the binding applies
    let (status, created) = send(
        &env.app,
        "POST",
        "/v1/memories",
        auth,
        Some(json!({"content": "likes tea", "memory_type": "preference"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["user_id"], "alice");

    // Another user: forbidden
    let (status, body) = send(
        &env.app,
        "POST",
        "/v1/memories",
        auth,
        Some(json!({"user_id": "bob", "content": "I am bob", "memory_type": "factual"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    // GET/PUT/DELETE without user_id also work off the binding
    let id = created["id"].as_str().unwrap().to_string();
    let (status, listed) = send(&env.app, "GET", "/v1/memories", auth, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, updated) = send(
        &env.app,
        "PUT",
        &format!("/v1/memories/{id}"),
        auth,
        Some(json!({"content": "likes oolong tea"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["content"], "likes oolong tea");

    // Bound-user stats endpoint
    let (status, stats) = send(&env.app, "GET", "/v1/users/me/stats", auth, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["user_id"], "alice");
    assert_eq!(stats["total_memories"], 1);
    assert_eq!(stats["by_type"]["preference"], 1);

    let (status, _) = send(
        &env.app,
        "DELETE",
        &format!("/v1/memories/{id}"),
        auth,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn project_scoped_key_requires_user_id() {
    let env = test_env(Some(ADMIN_TOKEN), 0);
    let (_, _, api_key) = setup_channel(&env.app).await;
    let auth: &[(&str, &str)] = &[("x-api-key", api_key.as_str())];

    let (status, body) = send(
        &env.app,
        "POST",
        "/v1/memories",
        auth,
        Some(json!({"content": "no user", "memory_type": "factual"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    // /users/me/stats refuses project-scoped keys
    let (status, body) = send(&env.app, "GET", "/v1/users/me/stats", auth, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

// ----------------------------------------------------------
// Scenario 3: dual-store compensation
// ----------------------------------------------------------

#[tokio::test]
async fn vector_failure_compensates_and_leaves_nothing() {
    let env = test_env(Some(ADMIN_TOKEN), 0);
    let (_, _, api_key) = setup_channel(&env.app).await;
    let auth: &[(&str, &str)] = &[("x-api-key", api_key.as_str())];

    env.index.fail_upserts.store(true, Ordering::SeqCst);
    let (status, body) = send(
        &env.app,
        "POST",
        "/v1/memories",
        auth,
        Some(json!({"user_id": "u1", "content": "X", "memory_type": "factual"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "vector_write_failed");
    env.index.fail_upserts.store(false, Ordering::SeqCst);

    let (status, listed) = send(&env.app, "GET", "/v1/memories?user_id=u1", auth, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 0);

    let (_, stats) = send(&env.app, "GET", "/v1/users/u1/stats", auth, None).await;
    assert_eq!(stats["total_memories"], 0);
}

// ----------------------------------------------------------
// Scenario 4: search hydration tolerance
// ----------------------------------------------------------

#[tokio::test]
async fn search_drops_points_without_metadata_rows() {
    let env = test_env(Some(ADMIN_TOKEN), 0);
    let (_, _, api_key) = setup_channel(&env.app).await;
    let auth: &[(&str, &str)] = &[("x-api-key", api_key.as_str())];

    let (_, created) = send(
        &env.app,
        "POST",
        "/v1/memories",
        auth,
        Some(json!({"user_id": "u1", "content": "X", "memory_type": "factual"})),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    // Remove the authoritative row while its vector point survives
    assert!(env.meta.delete_fragment(&id).await.unwrap());

    let (status, body) = send(
        &env.app,
        "POST",
        "/v1/memories/search",
        auth,
        Some(json!({"user_id": "u1", "query": "X"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
    assert_eq!(body["results"].as_array().unwrap().len(), 0);
}

// ----------------------------------------------------------
// Session history
// ----------------------------------------------------------

#[tokio::test]
async fn session_history_is_chronological() {
    let env = test_env(Some(ADMIN_TOKEN), 0);
    let (_, _, api_key) = setup_channel(&env.app).await;
    let auth: &[(&str, &str)] = &[("x-api-key", api_key.as_str())];

    for (content, role) in [("hello", "user"), ("hi! how can I help?", "assistant")] {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let (status, _) = send(
            &env.app,
            "POST",
            "/v1/memories",
            auth,
            Some(json!({
                "user_id": "u1",
                "content": content,
                "memory_type": "session",
                "role": role,
                "session_id": "s1",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(
        &env.app,
        "GET",
        "/v1/sessions/s1/history?user_id=u1",
        auth,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], "s1");
    assert_eq!(body["total"], 2);
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][1]["role"], "assistant");
}

// ----------------------------------------------------------
// Scenario 5: tenant cascade
// ----------------------------------------------------------

#[tokio::test]
async fn tenant_delete_cascades_to_keys_and_projects() {
    let env = test_env(Some(ADMIN_TOKEN), 0);
    let (tenant_id, project_id, project_key) = setup_channel(&env.app).await;

    let (_, minted) = send(
        &env.app,
        "POST",
        "/v1/channels/api-keys",
        ADMIN,
        Some(json!({"tenant_id": tenant_id, "project_id": project_id, "user_id": "alice"})),
    )
    .await;
    let user_key = minted["key"].as_str().unwrap().to_string();

    // Both keys authenticate before the cascade
    for key in [&project_key, &user_key] {
        let (status, _) = send(
            &env.app,
            "GET",
            "/v1/memories?user_id=alice",
            &[("x-api-key", key.as_str())],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, _) = send(
        &env.app,
        "DELETE",
        &format!("/v1/channels/tenants/{tenant_id}"),
        ADMIN,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Neither key authenticates afterwards
    for key in [&project_key, &user_key] {
        let (status, _) = send(
            &env.app,
            "GET",
            "/v1/memories?user_id=alice",
            &[("x-api-key", key.as_str())],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (_, tenants) = send(&env.app, "GET", "/v1/channels/tenants", ADMIN, None).await;
    assert!(!tenants
        .as_array()
        .unwrap()
        .iter()
        .any(|t| t["id"] == tenant_id.as_str()));

    let (_, projects) = send(
        &env.app,
        "GET",
        &format!("/v1/channels/projects?tenant_id={tenant_id}"),
        ADMIN,
        None,
    )
    .await;
    assert_eq!(projects.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn revoke_is_idempotent_over_http() {
    let env = test_env(Some(ADMIN_TOKEN), 0);
    let (_, project_id, api_key) = setup_channel(&env.app).await;

    let (_, keys) = send(
        &env.app,
        "GET",
        &format!("/v1/channels/api-keys?project_id={project_id}"),
        ADMIN,
        None,
    )
    .await;
    let key_id = keys[0]["key_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &env.app,
        "DELETE",
        &format!("/v1/channels/api-keys/{key_id}"),
        ADMIN,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], true);

    let (status, body) = send(
        &env.app,
        "DELETE",
        &format!("/v1/channels/api-keys/{key_id}"),
        ADMIN,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], false);

    // The revoked secret no longer authenticates
    let (status, _) = send(
        &env.app,
        "GET",
        "/v1/memories?user_id=u1",
        &[("x-api-key", api_key.as_str())],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ----------------------------------------------------------
// Scenario 6: rate-limit boundary
// ----------------------------------------------------------

#[tokio::test]
async fn rate_limit_boundary_n_pass_then_429() {
    let env = test_env(Some(ADMIN_TOKEN), 5);
    let (_, _, api_key) = setup_channel(&env.app).await;
    let auth: &[(&str, &str)] = &[("x-api-key", api_key.as_str())];

    for _ in 0..5 {
        let (status, _) = send(&env.app, "GET", "/v1/memories?user_id=u1", auth, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&env.app, "GET", "/v1/memories?user_id=u1", auth, None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limited");

    // Public paths stay reachable
    let (status, _) = send(&env.app, "GET", "/health", &[], None).await;
    assert_eq!(status, StatusCode::OK);
}
