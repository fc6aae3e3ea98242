use campfire_db::rules::PermissionDenied;
use campfire_types::paths::PathError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("local storage error: {0}")]
    LocalStorage(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not signed in")]
    NotSignedIn,

    #[error("Session with the given name already exists")]
    SessionTaken,

    #[error("Session with the given name does not exist")]
    SessionNotFound,

    #[error("an image named '{0}' already exists in this session")]
    ImageNameTaken(String),

    #[error("only the creator of the session may edit it")]
    NotCreator,
}

impl Error {
    /// Classify a failure coming out of the tree database or object storage.
    pub(crate) fn backend(err: anyhow::Error) -> Self {
        if let Some(denied) = err.chain().find_map(|c| c.downcast_ref::<PermissionDenied>()) {
            return Error::PermissionDenied(denied.0.clone());
        }
        if let Some(invalid) = err.chain().find_map(|c| c.downcast_ref::<PathError>()) {
            return Error::Validation(invalid.to_string());
        }
        Error::Backend(format!("{:#}", err))
    }

    pub(crate) fn local(err: anyhow::Error) -> Self {
        Error::LocalStorage(format!("{:#}", err))
    }
}

impl From<PathError> for Error {
    fn from(e: PathError) -> Self {
        Error::Validation(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Backend(format!("malformed data: {}", e))
    }
}
