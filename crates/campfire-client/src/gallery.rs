use std::path::Path;

use campfire_types::models::{ImageEntry, ImageRecord};
use campfire_types::paths::{NodePath, ObjectPath, SessionId};
use tracing::{info, warn};

use crate::backend::{Backend, Subscription};
use crate::error::{Error, Result};
use crate::records::keyed_records;

/// Images of a session: blobs in object storage plus one metadata record
/// each under `sessions/{id}/images`.
#[derive(Clone)]
pub struct Gallery {
    backend: Backend,
}

impl Gallery {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    pub async fn list_images(&self, session_id: &SessionId) -> Result<Vec<ImageEntry>> {
        let value = self.backend.db.get(&NodePath::images(session_id)).await?;
        Ok(to_entries(value))
    }

    pub async fn subscribe(&self, session_id: &SessionId) -> Result<ImageWatch> {
        let sub = self
            .backend
            .db
            .subscribe(&NodePath::images(session_id))
            .await?;
        Ok(ImageWatch { sub })
    }

    /// Upload the JPEG at `local_path` under `name`.
    pub async fn upload_image(
        &self,
        session_id: &SessionId,
        name: &str,
        local_path: &Path,
    ) -> Result<ImageEntry> {
        let data = tokio::fs::read(local_path).await.map_err(|e| {
            Error::LocalStorage(format!("cannot read {}: {}", local_path.display(), e))
        })?;
        self.upload_image_bytes(session_id, name, data).await
    }

    /// Store `data` as `sessions/{id}/{name}.jpg` and record it in the
    /// gallery. Names are unique within a session.
    pub async fn upload_image_bytes(
        &self,
        session_id: &SessionId,
        name: &str,
        data: Vec<u8>,
    ) -> Result<ImageEntry> {
        let object = ObjectPath::image(session_id, name)?;

        if self
            .list_images(session_id)
            .await?
            .iter()
            .any(|image| image.name == name)
        {
            return Err(Error::ImageNameTaken(name.to_string()));
        }

        self.backend.storage.put(&object, data).await?;

        match self.record_upload(session_id, name, &object).await {
            Ok(entry) => {
                info!("Uploaded {} to {}", name, session_id);
                Ok(entry)
            }
            Err(e) => {
                // Do not leave a blob behind that no record points at.
                if let Err(cleanup) = self.backend.storage.delete(&object).await {
                    warn!("Could not remove orphaned {}: {}", object, cleanup);
                }
                Err(e)
            }
        }
    }

    async fn record_upload(
        &self,
        session_id: &SessionId,
        name: &str,
        object: &ObjectPath,
    ) -> Result<ImageEntry> {
        let download_url = self
            .backend
            .storage
            .download_url(object)
            .await?
            .ok_or_else(|| Error::Backend(format!("{} vanished right after upload", object)))?;

        let record = ImageRecord {
            name: name.to_string(),
            download_url,
        };
        let key = self
            .backend
            .db
            .push(&NodePath::images(session_id), serde_json::to_value(&record)?)
            .await?;
        Ok(ImageEntry::from_record(key, record))
    }

    /// Remove the record, then the blob. A blob that is already gone is fine.
    pub async fn delete_image(&self, session_id: &SessionId, name: &str, key: &str) -> Result<()> {
        let record = NodePath::images(session_id).child(key)?;
        self.backend.db.remove(&record).await?;

        let object = ObjectPath::image(session_id, name)?;
        self.backend.storage.delete(&object).await
    }
}

/// Live image list, oldest first.
pub struct ImageWatch {
    sub: Subscription,
}

impl ImageWatch {
    pub async fn next(&mut self) -> Option<Result<Vec<ImageEntry>>> {
        let item = self.sub.next().await?;
        Some(item.map(to_entries))
    }
}

fn to_entries(value: Option<serde_json::Value>) -> Vec<ImageEntry> {
    keyed_records::<ImageRecord>(value)
        .into_iter()
        .map(|(key, record)| ImageEntry::from_record(key, record))
        .collect()
}
