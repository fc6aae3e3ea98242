//! Write rules for the realtime tree and object storage.
//!
//! Reads are open to every signed-in user. Writes are checked here against
//! the acting user id before they reach the database:
//!
//! * `sessions/{id}` may be created by anyone naming themselves as creator,
//!   and afterwards modified only by that creator.
//! * Everything below `sessions/{id}` belongs to the creator.
//! * `users/{uid}/...` belongs to `uid`.
//! * Nothing else is writable.

use anyhow::Result;
use campfire_types::paths::{NodePath, ObjectPath};
use serde_json::Value;
use thiserror::Error;

use crate::Database;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("permission denied: {0}")]
pub struct PermissionDenied(pub String);

fn deny<T>(reason: impl Into<String>) -> Result<T> {
    Err(PermissionDenied(reason.into()).into())
}

impl Database {
    /// Creator uid of a session, `None` if the session does not exist.
    pub fn session_creator(&self, session_id: &str) -> Result<Option<String>> {
        let path = NodePath::sessions().child(session_id)?.child("creator")?.child("uid")?;
        Ok(self.get(&path)?.and_then(|v| v.as_str().map(str::to_string)))
    }

    /// Check that `uid` may write `value` (`None` for a removal) at `path`.
    pub fn authorize_write(&self, uid: &str, path: &NodePath, value: Option<&Value>) -> Result<()> {
        let segments: Vec<&str> = path.segments().collect();

        match segments.as_slice() {
            ["sessions", id] => match self.session_creator(id)? {
                Some(creator) if creator == uid => Ok(()),
                Some(_) => deny(format!("only the creator of '{}' may modify it", id)),
                None => {
                    let claimed = value
                        .and_then(|v| v.pointer("/creator/uid"))
                        .and_then(Value::as_str);
                    if claimed == Some(uid) {
                        Ok(())
                    } else {
                        deny("a new session must name the caller as its creator")
                    }
                }
            },
            ["sessions", id, _, ..] => self.require_creator(uid, id),
            ["users", owner, ..] if *owner == uid => Ok(()),
            ["users", ..] => deny("users may only write their own records"),
            _ => deny(format!("{} is not writable", path)),
        }
    }

    /// Check that `uid` may upload or delete the object at `path`.
    pub fn authorize_object_write(&self, uid: &str, path: &ObjectPath) -> Result<()> {
        let segments: Vec<&str> = path.segments().collect();
        match segments.as_slice() {
            ["sessions", id, _file] => {
                if campfire_types::paths::validate_segment(id).is_err() {
                    return deny(format!("{} is not writable", path));
                }
                self.require_creator(uid, id)
            }
            _ => deny(format!("{} is not writable", path)),
        }
    }

    /// `set_if_absent` on behalf of `uid`. An occupied node reports `false`
    /// whoever owns it, including one created after the rule lookup.
    pub fn authorized_set_if_absent(&self, uid: &str, path: &NodePath, value: &Value) -> Result<bool> {
        if self.exists(path)? {
            return Ok(false);
        }
        if let Err(e) = self.authorize_write(uid, path, Some(value)) {
            if is_permission_denied(&e) && self.exists(path)? {
                return Ok(false);
            }
            return Err(e);
        }
        self.set_if_absent(path, value)
    }

    fn require_creator(&self, uid: &str, session_id: &str) -> Result<()> {
        match self.session_creator(session_id)? {
            Some(creator) if creator == uid => Ok(()),
            Some(_) => deny(format!("only the creator of '{}' may modify it", session_id)),
            None => deny(format!("session '{}' does not exist", session_id)),
        }
    }
}

/// True if `err` (or anything in its chain) is a rule denial.
pub fn is_permission_denied(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<PermissionDenied>())
}
