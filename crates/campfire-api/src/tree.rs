use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::debug;

use campfire_types::api::{Claims, PushResponse, SetIfAbsentResponse, SetQuery};
use campfire_types::paths::NodePath;

use crate::auth::AppState;
use crate::error::{ApiError, blocking};

/// GET /db/{*path}: one-shot read. Absent nodes read as `null`.
pub async fn get_node(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<Option<Value>>, ApiError> {
    let path = NodePath::parse(&raw)?;
    let db = state.db.clone();
    let value = blocking(move || db.get(&path)).await?;
    Ok(Json(value))
}

/// PUT /db/{*path}: replace the node. With `?if_absent=true` the write only
/// happens if the node does not exist yet, atomically.
pub async fn set_node(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Query(query): Query<SetQuery>,
    Extension(claims): Extension<Claims>,
    Json(value): Json<Value>,
) -> Result<Response, ApiError> {
    let path = NodePath::parse(&raw)?;
    let db = state.db.clone();
    let target = path.clone();
    let if_absent = query.if_absent;

    let written = blocking(move || {
        if if_absent {
            db.authorized_set_if_absent(&claims.sub, &target, &value)
        } else {
            db.authorize_write(&claims.sub, &target, Some(&value))?;
            db.set(&target, &value).map(|_| true)
        }
    })
    .await?;

    if written {
        debug!("Set {}", path);
        state.dispatcher.publish(path);
    }

    if if_absent {
        Ok(Json(SetIfAbsentResponse { written }).into_response())
    } else {
        Ok(StatusCode::NO_CONTENT.into_response())
    }
}

/// POST /db/{*path}: append under a generated push key.
pub async fn push_node(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(value): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let path = NodePath::parse(&raw)?;
    let db = state.db.clone();
    let target = path.clone();

    let key = blocking(move || {
        db.authorize_write(&claims.sub, &target, Some(&value))?;
        db.push(&target, &value)
    })
    .await?;

    state.dispatcher.publish(path.child(&key)?);
    Ok((StatusCode::CREATED, Json(PushResponse { key })))
}

/// DELETE /db/{*path}
pub async fn remove_node(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    let path = NodePath::parse(&raw)?;
    let db = state.db.clone();
    let target = path.clone();

    blocking(move || {
        db.authorize_write(&claims.sub, &target, None)?;
        db.remove(&target)
    })
    .await?;

    debug!("Removed {}", path);
    state.dispatcher.publish(path);
    Ok(StatusCode::NO_CONTENT)
}
