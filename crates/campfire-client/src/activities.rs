use campfire_types::models::{ActivityEntry, ActivityRecord, ActivityTime};
use campfire_types::paths::{NodePath, SessionId};

use crate::backend::{Backend, Subscription};
use crate::error::{Error, Result};
use crate::records::keyed_records;

/// The live activity list of a session.
#[derive(Clone)]
pub struct ActivityFeed {
    backend: Backend,
}

impl ActivityFeed {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    pub async fn subscribe(&self, session_id: &SessionId) -> Result<ActivityWatch> {
        let sub = self
            .backend
            .db
            .subscribe(&NodePath::activities(session_id))
            .await?;
        Ok(ActivityWatch { sub })
    }

    /// Append an activity and return its key. Subscribers see it on their
    /// next emission; this does not wait for that.
    pub async fn add_activity(
        &self,
        session_id: &SessionId,
        time: ActivityTime,
        activity: &str,
    ) -> Result<String> {
        if activity.trim().is_empty() {
            return Err(Error::Validation("activity text is empty".into()));
        }
        let record = ActivityRecord {
            time: time.to_string(),
            activity: activity.to_string(),
        };
        self.backend
            .db
            .push(&NodePath::activities(session_id), serde_json::to_value(record)?)
            .await
    }

    pub async fn delete_activity(&self, session_id: &SessionId, key: &str) -> Result<()> {
        let path = NodePath::activities(session_id).child(key)?;
        self.backend.db.remove(&path).await
    }
}

/// Live activity list. Every emission is the full list in insertion order.
pub struct ActivityWatch {
    sub: Subscription,
}

impl ActivityWatch {
    pub async fn next(&mut self) -> Option<Result<Vec<ActivityEntry>>> {
        let item = self.sub.next().await?;
        Some(item.map(|value| {
            keyed_records::<ActivityRecord>(value)
                .into_iter()
                .map(|(key, record)| ActivityEntry::from_record(key, record))
                .collect()
        }))
    }
}

/// Latest known activity list, as a screen would hold it.
#[derive(Debug, Default, Clone)]
pub struct ActivityList {
    entries: Vec<ActivityEntry>,
}

impl ActivityList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list with a fresh emission.
    pub fn apply(&mut self, entries: Vec<ActivityEntry>) {
        self.entries = entries;
    }

    /// Record that `key` was deleted. Deleting the last remaining entry
    /// empties the list right away; otherwise the next emission catches up.
    pub fn note_deleted(&mut self, key: &str) {
        if let [only] = self.entries.as_slice() {
            if only.key == key {
                self.entries.clear();
            }
        }
    }

    pub fn entries(&self) -> &[ActivityEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
