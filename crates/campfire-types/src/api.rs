use serde::{Deserialize, Serialize};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the WebSocket gateway.
/// Anonymous users have no name; `sub` is the backend-assigned user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymousSignInResponse {
    pub user_id: String,
    pub token: String,
}

// -- Realtime tree --

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetQuery {
    /// Only write if nothing exists at the path yet.
    #[serde(default)]
    pub if_absent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetIfAbsentResponse {
    pub written: bool,
}

// -- Object storage --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadUrlResponse {
    pub download_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadQuery {
    pub token: Option<String>,
}

// -- Errors --

/// Body returned by every endpoint on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// One of `VALIDATION_ERROR`, `UNAUTHORIZED`, `PERMISSION_DENIED`,
    /// `NOT_FOUND`, `INTERNAL_ERROR`.
    pub code: String,
    pub message: String,
}
