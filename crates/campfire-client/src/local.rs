//! In-process backend: the tree, change dispatch and object storage run
//! inside the client, with the same write rules the server enforces.

use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use campfire_db::Database;
use campfire_gateway::dispatcher::Dispatcher;
use campfire_storage::Storage;
use campfire_types::paths::{NodePath, ObjectPath};

use crate::backend::{AuthProvider, AuthSession, Backend, ObjectStore, RealtimeDb, Subscription};
use crate::error::{Error, Result};

/// Shared state behind every [`LocalBackend`]: one tree, one dispatcher,
/// one object store. Each user gets their own backend over it.
#[derive(Clone)]
pub struct LocalServer {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    storage: Arc<Storage>,
}

impl LocalServer {
    pub fn new(db: Arc<Database>, storage: Arc<Storage>) -> Self {
        Self {
            db,
            dispatcher: Dispatcher::new(),
            storage,
        }
    }

    /// Open (or create) a tree database and object directory under `dir`.
    pub async fn open(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::LocalStorage(e.to_string()))?;
        let db = Database::open(&dir.join("campfire.db")).map_err(Error::backend)?;
        let storage = Storage::new(dir.join("objects"), "http://localhost/")
            .await
            .map_err(Error::backend)?;
        info!("Local backend opened at {}", dir.display());
        Ok(Self::new(Arc::new(db), Arc::new(storage)))
    }

    /// A fresh backend, not signed in, sharing this server.
    pub fn backend(&self) -> Backend {
        Backend::from_shared(Arc::new(LocalBackend::new(self.clone())))
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Fetch the bytes behind a download URL issued by this server. `None`
    /// if the URL does not name a stored object or its token is stale.
    pub async fn resolve_download(&self, download_url: &str) -> Result<Option<Vec<u8>>> {
        let url = Url::parse(download_url).map_err(|e| Error::Validation(e.to_string()))?;
        let Some(raw) = url.path().strip_prefix("/objects/") else {
            return Ok(None);
        };
        let decoded: Vec<String> = raw
            .split('/')
            .map(percent_decode)
            .collect::<Result<_>>()?;
        let path = ObjectPath::parse(&decoded.join("/"))?;
        let token = url
            .query_pairs()
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned());

        let current = self.storage.content_token(&path).await.map_err(Error::backend)?;
        if current.is_none() || current != token {
            return Ok(None);
        }
        self.storage.read(&path).await.map_err(Error::backend)
    }
}

fn percent_decode(segment: &str) -> Result<String> {
    percent_decode_str(segment)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| Error::Validation(e.to_string()))
}

/// One user's view of a [`LocalServer`].
pub struct LocalBackend {
    server: LocalServer,
    user: RwLock<Option<String>>,
}

impl LocalBackend {
    pub fn new(server: LocalServer) -> Self {
        Self {
            server,
            user: RwLock::new(None),
        }
    }

    fn uid(&self) -> Result<String> {
        self.current_user().ok_or(Error::NotSignedIn)
    }

    fn set_user(&self, uid: &str) -> Result<()> {
        let mut user = self
            .user
            .write()
            .map_err(|_| Error::Backend("auth state poisoned".into()))?;
        *user = Some(uid.to_string());
        Ok(())
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Backend(format!("spawn_blocking join error: {}", e)))?
        .map_err(Error::backend)
}

#[async_trait]
impl RealtimeDb for LocalBackend {
    async fn get(&self, path: &NodePath) -> Result<Option<Value>> {
        self.uid()?;
        let db = self.server.db.clone();
        let path = path.clone();
        blocking(move || db.get(&path)).await
    }

    async fn set(&self, path: &NodePath, value: Value) -> Result<()> {
        let uid = self.uid()?;
        let db = self.server.db.clone();
        let target = path.clone();
        blocking(move || {
            db.authorize_write(&uid, &target, Some(&value))?;
            db.set(&target, &value)
        })
        .await?;
        self.server.dispatcher.publish(path.clone());
        Ok(())
    }

    async fn push(&self, path: &NodePath, value: Value) -> Result<String> {
        let uid = self.uid()?;
        let db = self.server.db.clone();
        let target = path.clone();
        let key = blocking(move || {
            db.authorize_write(&uid, &target, Some(&value))?;
            db.push(&target, &value)
        })
        .await?;
        self.server.dispatcher.publish(path.child(&key)?);
        Ok(key)
    }

    async fn remove(&self, path: &NodePath) -> Result<()> {
        let uid = self.uid()?;
        let db = self.server.db.clone();
        let target = path.clone();
        blocking(move || {
            db.authorize_write(&uid, &target, None)?;
            db.remove(&target)
        })
        .await?;
        self.server.dispatcher.publish(path.clone());
        Ok(())
    }

    async fn set_if_absent(&self, path: &NodePath, value: Value) -> Result<bool> {
        let uid = self.uid()?;
        let db = self.server.db.clone();
        let target = path.clone();
        let written = blocking(move || db.authorized_set_if_absent(&uid, &target, &value))
        .await?;
        if written {
            self.server.dispatcher.publish(path.clone());
        }
        Ok(written)
    }

    async fn subscribe(&self, path: &NodePath) -> Result<Subscription> {
        self.uid()?;
        debug!("Local subscription on {}", path);
        let mut watch = self
            .server
            .dispatcher
            .watch(self.server.db.clone(), path.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            while let Some(item) = watch.next().await {
                if tx.send(item.map_err(Error::backend)).is_err() {
                    break;
                }
            }
        });
        Ok(Subscription::new(rx, task))
    }
}

#[async_trait]
impl ObjectStore for LocalBackend {
    async fn put(&self, path: &ObjectPath, data: Vec<u8>) -> Result<()> {
        let uid = self.uid()?;
        campfire_storage::check_upload(&data).map_err(|e| Error::Validation(e.to_string()))?;
        let db = self.server.db.clone();
        let target = path.clone();
        blocking(move || db.authorize_object_write(&uid, &target)).await?;
        self.server.storage.put(path, &data).await.map_err(Error::backend)
    }

    async fn download_url(&self, path: &ObjectPath) -> Result<Option<String>> {
        self.uid()?;
        self.server.storage.download_url(path).await.map_err(Error::backend)
    }

    async fn delete(&self, path: &ObjectPath) -> Result<()> {
        let uid = self.uid()?;
        let db = self.server.db.clone();
        let target = path.clone();
        blocking(move || db.authorize_object_write(&uid, &target)).await?;
        self.server.storage.delete(path).await.map_err(Error::backend)
    }
}

#[async_trait]
impl AuthProvider for LocalBackend {
    async fn sign_in_anonymously(&self) -> Result<AuthSession> {
        let user_id = Uuid::new_v4().to_string();
        self.set_user(&user_id)?;
        info!("Anonymous sign-in: {}", user_id);
        Ok(AuthSession {
            user_id,
            token: None,
        })
    }

    async fn restore(&self, session: &AuthSession) -> Result<bool> {
        self.set_user(&session.user_id)?;
        Ok(true)
    }

    fn current_user(&self) -> Option<String> {
        self.user.read().ok().and_then(|u| u.clone())
    }
}
