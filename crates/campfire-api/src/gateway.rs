use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use campfire_gateway::connection;

use crate::auth::{AppState, verify_token};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: String,
}

/// GET /gateway?token=. Browsers cannot set headers on a WebSocket
/// handshake, so the JWT travels in the query string.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let claims = verify_token(&state.jwt_secret, &query.token).ok_or(ApiError::Unauthorized)?;

    let dispatcher = state.dispatcher.clone();
    let db = state.db.clone();
    Ok(ws
        .on_upgrade(move |socket| {
            connection::handle_connection(socket, dispatcher, db, claims.sub)
        })
        .into_response())
}
