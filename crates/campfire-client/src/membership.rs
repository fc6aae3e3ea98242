use std::collections::HashSet;

use campfire_types::models::MembershipRecord;
use campfire_types::paths::{NodePath, SessionId};
use tracing::warn;

use crate::backend::{Backend, Subscription};
use crate::error::Result;
use crate::records::keyed_records;

/// The list of sessions a user has created or imported.
#[derive(Clone)]
pub struct Membership {
    backend: Backend,
}

impl Membership {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Append `session_id` to the user's list. Importing the same session
    /// twice leaves two records; readers collapse them.
    pub async fn join_session(&self, user_id: &str, session_id: &SessionId) -> Result<String> {
        let record = MembershipRecord {
            session_id: session_id.as_str().to_string(),
        };
        self.backend
            .db
            .push(&NodePath::user_sessions(user_id)?, serde_json::to_value(record)?)
            .await
    }

    /// Live list of the user's sessions, oldest first.
    pub async fn list_sessions(&self, user_id: &str) -> Result<SessionListWatch> {
        let sub = self
            .backend
            .db
            .subscribe(&NodePath::user_sessions(user_id)?)
            .await?;
        Ok(SessionListWatch { sub })
    }
}

pub struct SessionListWatch {
    sub: Subscription,
}

impl SessionListWatch {
    pub async fn next(&mut self) -> Option<Result<Vec<SessionId>>> {
        let item = self.sub.next().await?;
        Some(item.map(session_ids))
    }
}

fn session_ids(value: Option<serde_json::Value>) -> Vec<SessionId> {
    let mut seen = HashSet::new();
    keyed_records::<MembershipRecord>(value)
        .into_iter()
        .filter_map(|(key, record)| match SessionId::parse(&record.session_id) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Membership {} names an invalid session: {}", key, e);
                None
            }
        })
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duplicates_collapse_to_first_occurrence() {
        let value = json!({
            "-Na": { "sessionId": "camp21" },
            "-Nb": { "sessionId": "lake" },
            "-Nc": { "sessionId": "camp21" },
            "-Nd": { "sessionId": "bad.id" },
        });
        let ids: Vec<String> = session_ids(Some(value))
            .iter()
            .map(|id| id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["camp21", "lake"]);
    }
}
