//! Bridges `orchestrator_core::Error` onto axum's response machinery. The
//! wire format is the `{status, message}` envelope from spec §7 — stack
//! traces stay in the tracing logs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use orchestrator_core::{Error, ErrorEnvelope};

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = ErrorEnvelope::from(&self.0);
        tracing::error!(error = %self.0, category = self.0.category(), "request failed");

        let status = StatusCode::from_u16(envelope.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(envelope)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
