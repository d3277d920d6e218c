//! Error taxonomy for the memory service
//!
//! Every error carries a machine-readable kind string that the HTTP surface
//! echoes in the `error` field of the response body.

use thiserror::Error;

/// Result type alias for Engrama operations
pub type Result<T> = std::result::Result<T, EngramaError>;

/// Errors that can occur across the memory service
#[derive(Debug, Error)]
pub enum EngramaError {
    /// Schema violation, length limit, enum parse failure
    #[error("validation error: {0}")]
    Validation(String),

    /// Semantic violation the caller can fix (missing user_id, unknown
    /// memory type, unsupported update field)
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credential
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Admin token mismatch or user-scoped key used for another user
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Entity missing or outside the caller's scope
    #[error("not found: {0}")]
    NotFound(String),

    /// Sliding window exceeded
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Secondary store failure; the metadata row has already been compensated
    #[error("vector write failed: {0}")]
    VectorWriteFailed(String),

    /// Metadata or vector store error
    #[error("storage error: {0}")]
    Storage(String),

    /// Embedding service error
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngramaError {
    /// Machine-readable error kind, surfaced in HTTP response bodies.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::RateLimited(_) => "rate_limited",
            Self::VectorWriteFailed(_) => "vector_write_failed",
            Self::Storage(_) | Self::Embedding(_) | Self::Serialization(_) | Self::Internal(_) => {
                "internal_error"
            }
        }
    }

    /// HTTP status code this error maps to.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::RateLimited(_) => 429,
            Self::VectorWriteFailed(_)
            | Self::Storage(_)
            | Self::Embedding(_)
            | Self::Serialization(_)
            | Self::Internal(_) => 500,
        }
    }
}

impl From<String> for EngramaError {
    fn from(s: String) -> Self {
        Self::Internal(s)
    }
}

impl From<&str> for EngramaError {
    fn from(s: &str) -> Self {
        Self::Internal(s.to_string())
    }
}
