use campfire_types::models::{Creator, SessionRecord};
use campfire_types::paths::{NodePath, SessionId};
use tracing::info;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::identity::IdentityCache;
use crate::membership::Membership;

/// Creating, importing and inspecting sessions.
#[derive(Clone)]
pub struct SessionDirectory {
    backend: Backend,
    cache: IdentityCache,
    membership: Membership,
}

impl SessionDirectory {
    pub fn new(backend: Backend, cache: IdentityCache) -> Self {
        let membership = Membership::new(backend.clone());
        Self {
            backend,
            cache,
            membership,
        }
    }

    pub async fn session_exists(&self, session_id: &SessionId) -> Result<bool> {
        Ok(self
            .backend
            .db
            .get(&NodePath::session(session_id))
            .await?
            .is_some())
    }

    /// Create `session_id` owned by the signed-in user, add it to their
    /// list and make it the current session.
    ///
    /// The existence check and the write are one atomic step, so of two
    /// racing creators exactly one succeeds.
    pub async fn create_session(&self, session_id: &SessionId) -> Result<()> {
        let uid = self.signed_in()?;
        let record = serde_json::to_value(SessionRecord::new(&uid))?;
        let created = self
            .backend
            .db
            .set_if_absent(&NodePath::session(session_id), record)
            .await?;
        if !created {
            return Err(Error::SessionTaken);
        }

        info!("{} created session {}", uid, session_id);
        self.membership.join_session(&uid, session_id).await?;
        self.cache.set_current_session(session_id.as_str())
    }

    /// Join an existing session created by someone else (or by ourselves on
    /// another device) and make it the current session.
    pub async fn import_session(&self, session_id: &SessionId) -> Result<()> {
        let uid = self.signed_in()?;
        if !self.session_exists(session_id).await? {
            return Err(Error::SessionNotFound);
        }

        info!("{} imported session {}", uid, session_id);
        self.membership.join_session(&uid, session_id).await?;
        self.cache.set_current_session(session_id.as_str())
    }

    /// Uid of the session's creator, `None` if the session does not exist.
    pub async fn get_creator(&self, session_id: &SessionId) -> Result<Option<String>> {
        let value = self.backend.db.get(&NodePath::creator(session_id)).await?;
        match value {
            Some(v) => Ok(Some(serde_json::from_value::<Creator>(v)?.uid)),
            None => Ok(None),
        }
    }

    fn signed_in(&self) -> Result<String> {
        self.backend.auth.current_user().ok_or(Error::NotSignedIn)
    }
}
