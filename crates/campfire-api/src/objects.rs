use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use tracing::{info, warn};

use campfire_types::api::{Claims, DownloadQuery, DownloadUrlResponse};
use campfire_types::paths::ObjectPath;

use crate::auth::AppState;
use crate::error::{ApiError, blocking};

pub use campfire_storage::MAX_OBJECT_SIZE;

/// PUT /storage/{*path}: store raw bytes, replacing any previous object.
pub async fn upload_object(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Extension(claims): Extension<Claims>,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let path = ObjectPath::parse(&raw)?;
    campfire_storage::check_upload(&bytes).map_err(|e| ApiError::Validation(e.to_string()))?;

    let db = state.db.clone();
    let target = path.clone();
    let uid = claims.sub.clone();
    blocking(move || db.authorize_object_write(&uid, &target)).await?;

    state.storage.put(&path, &bytes).await?;
    info!("{} uploaded {}", claims.sub, path);
    Ok(StatusCode::CREATED)
}

/// DELETE /storage/{*path}: missing objects are not an error.
pub async fn delete_object(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    let path = ObjectPath::parse(&raw)?;

    let db = state.db.clone();
    let target = path.clone();
    blocking(move || db.authorize_object_write(&claims.sub, &target)).await?;

    state.storage.delete(&path).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /storage-url/{*path}
pub async fn download_url(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<DownloadUrlResponse>, ApiError> {
    let path = ObjectPath::parse(&raw)?;
    let download_url = state
        .storage
        .download_url(&path)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no object at {}", path)))?;
    Ok(Json(DownloadUrlResponse { download_url }))
}

/// GET /objects/{*path}?token=, the public download. The token is what makes
/// the URL a capability, so a stale or missing one reads as not found.
pub async fn download_object(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let path = ObjectPath::parse(&raw)?;
    let not_found = || ApiError::NotFound(format!("no object at {}", path));

    let expected = state.storage.content_token(&path).await?.ok_or_else(not_found)?;
    if query.token.as_deref() != Some(expected.as_str()) {
        warn!("Rejected download of {} with a stale token", path);
        return Err(not_found());
    }

    let bytes = state.storage.read(&path).await?.ok_or_else(not_found)?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes))
}
