use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use campfire_db::Database;
use campfire_storage::Storage;
use campfire_types::models::ImageRecord;
use campfire_types::paths::{NodePath, ObjectPath, SessionId};

/// Blobs younger than this are left alone: an upload may still be waiting
/// for its metadata record.
const GRACE_PERIOD: Duration = Duration::from_secs(10 * 60);

/// Background task that deletes blobs no image record points at.
///
/// An upload whose metadata write failed, or an image removed by a client
/// that went away before deleting the blob, leaves such orphans behind.
pub async fn run_cleanup_loop(db: Arc<Database>, storage: Arc<Storage>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match sweep_orphans(&db, &storage, GRACE_PERIOD).await {
            Ok(count) => {
                if count > 0 {
                    info!("Cleanup: deleted {} orphaned blobs", count);
                }
            }
            Err(e) => {
                warn!("Cleanup error: {}", e);
            }
        }
    }
}

pub async fn sweep_orphans(db: &Arc<Database>, storage: &Storage, grace: Duration) -> anyhow::Result<usize> {
    let mut deleted = 0;

    for raw_id in storage.list_sessions().await? {
        let Ok(session) = SessionId::parse(&raw_id) else {
            warn!("Cleanup: skipping unexpected storage directory '{}'", raw_id);
            continue;
        };

        let referenced = referenced_objects(db, &session).await?;
        for object in storage.list_session_objects(session.as_str()).await? {
            if referenced.contains(&object) {
                continue;
            }
            match storage.age(&object).await? {
                Some(age) if age >= grace => {
                    storage.delete(&object).await?;
                    deleted += 1;
                }
                _ => {}
            }
        }
    }

    Ok(deleted)
}

/// Object paths of every image record of a session.
async fn referenced_objects(db: &Arc<Database>, session: &SessionId) -> anyhow::Result<HashSet<ObjectPath>> {
    let db = db.clone();
    let images = NodePath::images(session);
    let value = tokio::task::spawn_blocking(move || db.get(&images)).await??;

    let mut referenced = HashSet::new();
    let Some(serde_json::Value::Object(records)) = value else {
        return Ok(referenced);
    };
    for (_, record) in records {
        if let Ok(image) = serde_json::from_value::<ImageRecord>(record) {
            if let Ok(path) = ObjectPath::image(session, &image.name) {
                referenced.insert(path);
            }
        }
    }
    Ok(referenced)
}
