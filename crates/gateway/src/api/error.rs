//! Maps `nm_domain::error::Error` onto the HTTP error-kind table of §7.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use nm_domain::error::Error as DomainError;

pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            DomainError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            DomainError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            DomainError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            DomainError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            DomainError::Timeout(msg) => (StatusCode::REQUEST_TIMEOUT, msg.clone()),
            other => {
                tracing::error!(error = %other, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// `403` for plugin-facing endpoints while `tavern_mode_active` is false.
pub fn require_tavern_mode(active: bool) -> ApiResult<()> {
    if active {
        Ok(())
    } else {
        Err(ApiError(DomainError::Forbidden(
            "tavern mode is not active".into(),
        )))
    }
}
