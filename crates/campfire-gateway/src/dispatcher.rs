use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use campfire_db::Database;
use campfire_types::events::NodeChanged;
use campfire_types::paths::NodePath;

/// Fans out tree changes to every live subscription.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for change notifications; every watch receives every change
    broadcast_tx: broadcast::Sender<NodeChanged>,

    /// Number of live watches, for health reporting
    active_watches: AtomicUsize,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                active_watches: AtomicUsize::new(0),
            }),
        }
    }

    /// Subscribe to raw change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeChanged> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Announce that the subtree at `path` was written.
    pub fn publish(&self, path: NodePath) {
        debug!("Node changed: {}", path);
        let _ = self.inner.broadcast_tx.send(NodeChanged { path });
    }

    pub fn active_watches(&self) -> usize {
        self.inner.active_watches.load(Ordering::Relaxed)
    }

    /// Start a live subscription on `path`: the current value is delivered
    /// immediately, then again after every change that overlaps `path`.
    /// Consecutive identical values are delivered once.
    pub fn watch(&self, db: Arc<Database>, path: NodePath) -> Watch {
        // Subscribe before the first read so no change can slip in between.
        let mut changes = self.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.active_watches.fetch_add(1, Ordering::Relaxed);
        let guard = WatchCountGuard(self.inner.clone());

        let task = tokio::spawn(async move {
            let _guard = guard;
            let mut last: Option<Option<Value>> = None;

            loop {
                let value = match read(&db, &path).await {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("Watch on {} failed to read: {}", path, e);
                        let _ = tx.send(Err(e));
                        return;
                    }
                };

                if last.as_ref() != Some(&value) {
                    if tx.send(Ok(value.clone())).is_err() {
                        return;
                    }
                    last = Some(value);
                }

                // Wait for the next relevant change.
                loop {
                    match changes.recv().await {
                        Ok(event) if event.path.overlaps(&path) => break,
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Watch on {} lagged by {} changes, re-reading", path, n);
                            break;
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        });

        Watch { rx, task }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

struct WatchCountGuard(Arc<DispatcherInner>);

impl Drop for WatchCountGuard {
    fn drop(&mut self) {
        self.0.active_watches.fetch_sub(1, Ordering::Relaxed);
    }
}

async fn read(db: &Arc<Database>, path: &NodePath) -> Result<Option<Value>> {
    let db = db.clone();
    let path = path.clone();
    tokio::task::spawn_blocking(move || db.get(&path)).await?
}

/// A live subscription. Dropping it stops the background reader.
pub struct Watch {
    rx: mpsc::UnboundedReceiver<Result<Option<Value>>>,
    task: JoinHandle<()>,
}

impl Watch {
    /// Next value of the watched path. `None` once the watch has ended.
    pub async fn next(&mut self) -> Option<Result<Option<Value>>> {
        self.rx.recv().await
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.task.abort();
    }
}
