use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::info;
use uuid::Uuid;

use campfire_db::Database;
use campfire_gateway::dispatcher::Dispatcher;
use campfire_storage::Storage;
use campfire_types::api::{AnonymousSignInResponse, Claims};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub storage: Arc<Storage>,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
}

/// POST /auth/anonymous: issue a fresh anonymous identity.
pub async fn sign_in_anonymously(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = Uuid::new_v4().to_string();
    let token = create_token(&state.jwt_secret, &user_id)?;

    info!("Anonymous sign-in: {}", user_id);

    Ok((
        StatusCode::CREATED,
        Json(AnonymousSignInResponse { user_id, token }),
    ))
}

pub fn create_token(secret: &str, user_id: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validate a token and return its claims.
pub fn verify_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}
