use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use campfire_db::rules::PermissionDenied;
use campfire_types::api::ErrorBody;
use campfire_types::paths::PathError;

/// Failure of an API call, mapped onto a status code and [`ErrorBody`].
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Unauthorized,
    PermissionDenied(String),
    NotFound(String),
    Internal(String),
}

impl ApiError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        let (status, code, message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
            ),
            ApiError::PermissionDenied(msg) => (StatusCode::FORBIDDEN, "PERMISSION_DENIED", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };
        (
            status,
            ErrorBody {
                code: code.to_string(),
                message,
            },
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<PathError> for ApiError {
    fn from(e: PathError) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        if let Some(denied) = e.chain().find_map(|c| c.downcast_ref::<PermissionDenied>()) {
            return ApiError::PermissionDenied(denied.0.clone());
        }
        if let Some(invalid) = e.chain().find_map(|c| c.downcast_ref::<PathError>()) {
            return ApiError::Validation(invalid.to_string());
        }
        ApiError::Internal(format!("{:#}", e))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("spawn_blocking join error: {}", e))
    }
}

/// Run blocking database work off the async runtime.
pub async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}
