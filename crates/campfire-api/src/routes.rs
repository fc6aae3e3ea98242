use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    middleware,
    routing::{get, post, put},
};
use serde_json::{Value, json};

use crate::auth::{self, AppState};
use crate::gateway;
use crate::middleware::require_auth;
use crate::objects::{self, MAX_OBJECT_SIZE};
use crate::tree;

/// Every HTTP and WebSocket route of the backend.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/anonymous", post(auth::sign_in_anonymously))
        .route("/objects/{*path}", get(objects::download_object))
        .route("/gateway", get(gateway::ws_upgrade))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route(
            "/db/{*path}",
            get(tree::get_node)
                .put(tree::set_node)
                .post(tree::push_node)
                .delete(tree::remove_node),
        )
        .route(
            "/storage/{*path}",
            put(objects::upload_object).delete(objects::delete_object),
        )
        .route("/storage-url/{*path}", get(objects::download_url))
        .layer(DefaultBodyLimit::max(MAX_OBJECT_SIZE))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "active_watches": state.dispatcher.active_watches(),
    }))
}
