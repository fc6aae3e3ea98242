use std::path::Path;
use std::sync::Arc;

use campfire_db::Database;

use crate::error::{Error, Result};

pub const CURRENT_USER: &str = "currentUser";
pub const CURRENT_SESSION: &str = "currentSession";
pub const AUTH_TOKEN: &str = "authToken";

/// Device-local key-value store remembering who the user is and which
/// session they last opened. Last write wins.
#[derive(Clone)]
pub struct IdentityCache {
    db: Arc<Database>,
}

impl IdentityCache {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::open(path).map_err(Error::local)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn in_memory() -> Result<Self> {
        let db = Database::open_in_memory().map_err(Error::local)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.db.kv_get(key).map_err(Error::local)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.db.kv_set(key, value).map_err(Error::local)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.db.kv_remove(key).map_err(Error::local)
    }

    pub fn current_user(&self) -> Result<Option<String>> {
        self.get(CURRENT_USER)
    }

    pub fn set_current_user(&self, uid: &str) -> Result<()> {
        self.set(CURRENT_USER, uid)
    }

    pub fn current_session(&self) -> Result<Option<String>> {
        self.get(CURRENT_SESSION)
    }

    pub fn set_current_session(&self, session_id: &str) -> Result<()> {
        self.set(CURRENT_SESSION, session_id)
    }

    pub fn auth_token(&self) -> Result<Option<String>> {
        self.get(AUTH_TOKEN)
    }

    pub fn set_auth_token(&self, token: &str) -> Result<()> {
        self.set(AUTH_TOKEN, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cache.db");
        {
            let cache = IdentityCache::open(&file).unwrap();
            cache.set_current_user("u1").unwrap();
            cache.set_current_session("camp21").unwrap();
        }
        let cache = IdentityCache::open(&file).unwrap();
        assert_eq!(cache.current_user().unwrap().as_deref(), Some("u1"));
        assert_eq!(cache.current_session().unwrap().as_deref(), Some("camp21"));
        assert_eq!(cache.auth_token().unwrap(), None);
    }

    #[test]
    fn last_write_wins() {
        let cache = IdentityCache::in_memory().unwrap();
        cache.set_current_session("camp21").unwrap();
        cache.set_current_session("camp22").unwrap();
        assert_eq!(cache.current_session().unwrap().as_deref(), Some("camp22"));

        cache.remove(CURRENT_SESSION).unwrap();
        assert_eq!(cache.current_session().unwrap(), None);
    }
}
