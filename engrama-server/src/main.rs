//! Engrama service binary
//!
//! Wires configuration, the metadata store, the vector index, the
//! embedding client, the rate limiter, and the HTTP surface; then serves
//! until interrupted, draining in-flight requests on shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use engrama_memory::{HttpEmbeddingProvider, MemoryEngine};
use engrama_server::{build_app, AppState, EngramaConfig, RateLimiter};
use engrama_storage::meta::{MetaStore, SqliteMetaStore};
use engrama_storage::vector::{QdrantIndex, VectorIndex};
use engrama_tenancy::ChannelManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngramaConfig::load().context("load configuration")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.data_dir.display(),
        "engrama starting"
    );

    let meta: Arc<dyn MetaStore> =
        Arc::new(SqliteMetaStore::new(config.metadata_db_path()).context("open metadata store")?);

    let vectors: Arc<dyn VectorIndex> = Arc::new(QdrantIndex::new(
        &config.vector.endpoint,
        config.vector.api_key.clone(),
        &config.vector.collection,
        config.vector.dimension,
    ));
    vectors
        .ensure_collection()
        .await
        .context("initialize vector collection")?;

    let embeddings = Arc::new(HttpEmbeddingProvider::new(
        &config.embedding.endpoint,
        config.embedding.api_key.clone(),
        config.vector.dimension,
    ));

    let limiter = Arc::new(
        RateLimiter::connect(config.redis_url.as_deref(), config.rate_limit_per_minute).await,
    );

    let engine = Arc::new(MemoryEngine::new(
        Arc::clone(&meta),
        Arc::clone(&vectors),
        embeddings,
    ));
    let channels = Arc::new(ChannelManager::new(meta, vectors));

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        engine,
        channels,
        limiter,
        config: Arc::new(config),
    };
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("bind {bind_addr}"))?;
    info!(addr = %bind_addr, "engrama listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serve")?;

    info!("engrama stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, draining in-flight requests");
}
