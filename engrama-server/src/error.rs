//! HTTP error mapping
//!
//! One place turns [`EngramaError`] into a status code and the
//! `{error, detail}` body every endpoint shares.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use engrama_core::EngramaError;

/// Response-side wrapper around the core error taxonomy.
#[derive(Debug)]
pub struct ApiError(pub EngramaError);

impl From<EngramaError> for ApiError {
    fn from(e: EngramaError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(kind = self.0.kind(), detail = %self.0, "request failed");
        }
        let body = json!({
            "error": self.0.kind(),
            "detail": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
