use std::sync::Arc;

use async_trait::async_trait;
use campfire_types::paths::{NodePath, ObjectPath};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;

/// The shared realtime tree.
#[async_trait]
pub trait RealtimeDb: Send + Sync {
    /// One-shot read. `None` if nothing is stored at `path`.
    async fn get(&self, path: &NodePath) -> Result<Option<Value>>;

    /// Replace the node at `path`.
    async fn set(&self, path: &NodePath, value: Value) -> Result<()>;

    /// Append under a generated push key and return the key.
    async fn push(&self, path: &NodePath, value: Value) -> Result<String>;

    async fn remove(&self, path: &NodePath) -> Result<()>;

    /// Write only if `path` is empty. Returns whether the write happened.
    async fn set_if_absent(&self, path: &NodePath, value: Value) -> Result<bool>;

    /// Live subscription: the current value first, then the value after
    /// every change to `path` or anything above or below it.
    async fn subscribe(&self, path: &NodePath) -> Result<Subscription>;
}

/// Blob storage for session images.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, path: &ObjectPath, data: Vec<u8>) -> Result<()>;

    /// Retrievable URL of a stored object, `None` if there is no such object.
    async fn download_url(&self, path: &ObjectPath) -> Result<Option<String>>;

    /// Deleting a missing object is not an error.
    async fn delete(&self, path: &ObjectPath) -> Result<()>;
}

/// An anonymous identity, as handed out by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: String,
    /// Bearer token for remote backends.
    pub token: Option<String>,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in_anonymously(&self) -> Result<AuthSession>;

    /// Resume a previously issued identity. Returns `false` if the backend
    /// cannot take it back and a fresh sign-in is needed.
    async fn restore(&self, session: &AuthSession) -> Result<bool>;

    /// The user currently signed in, if any.
    fn current_user(&self) -> Option<String>;
}

/// Handles to everything a client talks to. Cheap to clone.
#[derive(Clone)]
pub struct Backend {
    pub db: Arc<dyn RealtimeDb>,
    pub storage: Arc<dyn ObjectStore>,
    pub auth: Arc<dyn AuthProvider>,
}

impl Backend {
    /// Use one object for all three roles.
    pub fn from_shared<T>(shared: Arc<T>) -> Self
    where
        T: RealtimeDb + ObjectStore + AuthProvider + 'static,
    {
        Self {
            db: shared.clone(),
            storage: shared.clone(),
            auth: shared,
        }
    }
}

/// A live stream of values for one tree path. Dropping it unsubscribes.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Result<Option<Value>>>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Wrap the receiving end of a feeder task. The task is aborted when the
    /// subscription is dropped.
    pub fn new(rx: mpsc::UnboundedReceiver<Result<Option<Value>>>, task: JoinHandle<()>) -> Self {
        Self { rx, task }
    }

    /// Next value. `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<Result<Option<Value>>> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
