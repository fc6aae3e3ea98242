use anyhow::{Context, Result, anyhow};
use campfire_types::paths::ObjectPath;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{info, warn};
use url::Url;

/// 20 MB upload limit for a single image.
pub const MAX_OBJECT_SIZE: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("empty upload")]
    Empty,
    #[error("object exceeds {} bytes", MAX_OBJECT_SIZE)]
    TooLarge,
}

/// Size check applied to every upload, whichever backend receives it.
pub fn check_upload(data: &[u8]) -> Result<(), UploadError> {
    if data.is_empty() {
        Err(UploadError::Empty)
    } else if data.len() > MAX_OBJECT_SIZE {
        Err(UploadError::TooLarge)
    } else {
        Ok(())
    }
}

/// On-disk object storage for session images.
///
/// Each object is stored as a single file at `{storage_dir}/{object_path}`.
/// Download URLs carry the SHA-256 of the content as an access token, so a
/// URL stops resolving once the object is replaced or deleted.
pub struct Storage {
    dir: PathBuf,
    public_url: Url,
}

impl Storage {
    pub async fn new(dir: PathBuf, public_url: &str) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        let public_url =
            Url::parse(public_url).with_context(|| format!("invalid public URL '{}'", public_url))?;
        if public_url.cannot_be_a_base() {
            return Err(anyhow!("public URL '{}' cannot be a base", public_url));
        }
        info!("Object storage directory: {}", dir.display());
        Ok(Self { dir, public_url })
    }

    /// Path to the file for a given object.
    pub fn file_path(&self, path: &ObjectPath) -> PathBuf {
        let mut file = self.dir.clone();
        for segment in path.segments() {
            file.push(segment);
        }
        file
    }

    /// Write an object, replacing any previous content.
    pub async fn put(&self, path: &ObjectPath, data: &[u8]) -> Result<()> {
        let file_path = self.file_path(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write beside the target and rename, so readers never see a partial blob.
        let tmp = file_path.with_extension("part");
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.flush().await?;
        drop(file);
        fs::rename(&tmp, &file_path).await?;

        info!("Stored {} ({} bytes)", path, data.len());
        Ok(())
    }

    /// Read a whole object. `None` if it does not exist.
    pub async fn read(&self, path: &ObjectPath) -> Result<Option<Vec<u8>>> {
        match fs::read(self.file_path(path)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, path: &ObjectPath) -> Result<bool> {
        Ok(fs::try_exists(self.file_path(path)).await?)
    }

    /// Time since the object was last written, `None` if it does not exist.
    pub async fn age(&self, path: &ObjectPath) -> Result<Option<Duration>> {
        let meta = match fs::metadata(self.file_path(path)).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        // A clock that moved backwards makes the file look brand new.
        Ok(Some(meta.modified()?.elapsed().unwrap_or_default()))
    }

    /// Delete an object. Deleting something already gone is not an error.
    pub async fn delete(&self, path: &ObjectPath) -> Result<()> {
        match fs::remove_file(self.file_path(path)).await {
            Ok(()) => {
                info!("Deleted object {}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Object {} already gone", path);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Compute the access token (SHA-256 of the content) of a stored object.
    pub async fn content_token(&self, path: &ObjectPath) -> Result<Option<String>> {
        let mut file = match fs::File::open(self.file_path(path)).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 256 * 1024];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Some(hex::encode(hasher.finalize())))
    }

    /// Public URL for a stored object, `None` if it does not exist.
    pub async fn download_url(&self, path: &ObjectPath) -> Result<Option<String>> {
        let Some(token) = self.content_token(path).await? else {
            return Ok(None);
        };

        let mut url = self.public_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("public URL cannot be a base"))?
            .pop_if_empty()
            .push("objects")
            .extend(path.segments());
        url.query_pairs_mut().append_pair("token", &token);
        Ok(Some(url.to_string()))
    }

    /// List all objects stored under `sessions/{session_id}/`.
    pub async fn list_session_objects(&self, session_id: &str) -> Result<Vec<ObjectPath>> {
        let dir = self.dir.join("sessions").join(session_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut objects = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(".part") {
                    continue;
                }
                objects.push(ObjectPath::parse(&format!("sessions/{}/{}", session_id, name))?);
            }
        }
        objects.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(objects)
    }

    /// Session ids that have a directory in storage.
    pub async fn list_sessions(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(self.dir.join("sessions")).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
