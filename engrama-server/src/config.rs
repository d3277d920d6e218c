//! Service configuration
//!
//! Read once at process start: a TOML file (`engrama.toml` or the path in
//! `ENGRAMA_CONFIG`) merged with `ENGRAMA_*` environment-variable
//! overrides. Everything is read-only afterward.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use engrama_core::{EngramaError, Result};

/// Vector store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Qdrant endpoint, e.g. `http://localhost:6333`
    pub endpoint: String,
    /// Optional API key
    pub api_key: Option<String>,
    /// Shared collection name
    pub collection: String,
    /// Embedding vector dimension
    pub dimension: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:6333".to_string(),
            api_key: None,
            collection: "engrama_memories".to_string(),
            dimension: 1024,
        }
    }
}

/// Embedding service connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// TEI-style endpoint exposing `POST /embed`
    pub endpoint: String,
    /// Optional bearer token
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".to_string(),
            api_key: None,
        }
    }
}

/// Process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngramaConfig {
    /// Listen address
    pub bind_addr: String,
    /// Data directory (holds the metadata database by default)
    pub data_dir: PathBuf,
    /// Explicit metadata database path; defaults to
    /// `<data_dir>/engrama_meta.db`
    pub metadata_db_path: Option<PathBuf>,
    /// Vector store settings
    pub vector: VectorConfig,
    /// Embedding service settings
    pub embedding: EmbeddingConfig,
    /// Redis URL for the distributed rate limiter; absent means the
    /// in-process fallback only
    pub redis_url: Option<String>,
    /// Admin token for channel management. Unset means channel management
    /// is disabled (fail-closed).
    pub admin_token: Option<String>,
    /// Allowed CORS origins: `*` or a comma-separated list
    pub cors_origins: String,
    /// Sliding-window limit per identity per minute; 0 disables limiting
    pub rate_limit_per_minute: u32,
}

impl Default for EngramaConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8600".to_string(),
            data_dir: PathBuf::from("./data"),
            metadata_db_path: None,
            vector: VectorConfig::default(),
            embedding: EmbeddingConfig::default(),
            redis_url: None,
            admin_token: None,
            cors_origins: "*".to_string(),
            rate_limit_per_minute: 0,
        }
    }
}

impl EngramaConfig {
    /// Load configuration: TOML file if present, then environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`EngramaError::Validation`] when the file exists but does
    /// not parse.
    pub fn load() -> Result<Self> {
        let path = std::env::var("ENGRAMA_CONFIG")
            .map_or_else(|_| PathBuf::from("engrama.toml"), PathBuf::from);
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`EngramaError::Validation`] on read or parse failure.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngramaError::Validation(format!("read config {}: {e}", path.display())))?;
        let config = toml::from_str(&raw)
            .map_err(|e| EngramaError::Validation(format!("parse config {}: {e}", path.display())))?;
        debug!(path = %path.display(), "configuration file loaded");
        Ok(config)
    }

    /// Resolved metadata database path.
    #[must_use]
    pub fn metadata_db_path(&self) -> PathBuf {
        self.metadata_db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("engrama_meta.db"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ENGRAMA_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Ok(v) = std::env::var("ENGRAMA_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ENGRAMA_METADATA_DB") {
            self.metadata_db_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("ENGRAMA_VECTOR_ENDPOINT") {
            self.vector.endpoint = v;
        }
        if let Ok(v) = std::env::var("ENGRAMA_VECTOR_API_KEY") {
            self.vector.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("ENGRAMA_VECTOR_COLLECTION") {
            self.vector.collection = v;
        }
        if let Ok(v) = std::env::var("ENGRAMA_VECTOR_DIMENSION") {
            if let Ok(parsed) = v.parse() {
                self.vector.dimension = parsed;
            }
        }
        if let Ok(v) = std::env::var("ENGRAMA_EMBEDDING_ENDPOINT") {
            self.embedding.endpoint = v;
        }
        if let Ok(v) = std::env::var("ENGRAMA_EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("ENGRAMA_REDIS_URL") {
            self.redis_url = Some(v);
        }
        if let Ok(v) = std::env::var("ENGRAMA_ADMIN_TOKEN") {
            if v.is_empty() {
                self.admin_token = None;
            } else {
                self.admin_token = Some(v);
            }
        }
        if let Ok(v) = std::env::var("ENGRAMA_CORS_ORIGINS") {
            self.cors_origins = v;
        }
        if let Ok(v) = std::env::var("ENGRAMA_RATE_LIMIT") {
            if let Ok(parsed) = v.parse() {
                self.rate_limit_per_minute = parsed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngramaConfig::default();
        assert_eq!(config.rate_limit_per_minute, 0);
        assert_eq!(config.cors_origins, "*");
        assert!(config.admin_token.is_none());
        assert!(config
            .metadata_db_path()
            .ends_with("engrama_meta.db"));
    }

    #[test]
    fn toml_round_trip() {
        let toml_src = r#"
            bind_addr = "127.0.0.1:9000"
            rate_limit_per_minute = 60
            admin_token = "secret"

            [vector]
            endpoint = "http://qdrant:6333"
            collection = "memories"
            dimension = 384
        "#;
        let config: EngramaConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.rate_limit_per_minute, 60);
        assert_eq!(config.vector.dimension, 384);
        assert_eq!(config.admin_token.as_deref(), Some("secret"));
        // Unset sections fall back to defaults
        assert_eq!(config.embedding.endpoint, "http://localhost:8080");
    }
}
