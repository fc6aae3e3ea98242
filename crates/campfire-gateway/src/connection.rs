use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};

use campfire_db::Database;
use campfire_types::events::{GatewayCommand, GatewayEvent};
use campfire_types::paths::NodePath;

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a pre-authenticated WebSocket connection.
/// The JWT was already validated at the HTTP upgrade layer, so we go
/// straight to Ready + event loop.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: String,
) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} connected to gateway", user_id);

    let ready = GatewayEvent::Ready {
        user_id: user_id.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    // Every subscription forwards into this channel; the send task drains it.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<GatewayEvent>();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = out_rx.recv() => {
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let user_recv = user_id.clone();
    let mut recv_task = tokio::spawn(async move {
        // Dropped with the task, whether it ends or is aborted.
        let mut subscriptions = Subscriptions::default();

        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(text.as_str()) {
                    Ok(cmd) => {
                        handle_command(&dispatcher, &db, &user_recv, cmd, &mut subscriptions, &out_tx);
                    }
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            user_recv,
                            e,
                            text.as_str().chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} disconnected from gateway", user_id);
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), ()> {
    let text = serde_json::to_string(event).map_err(|e| warn!("Unserializable event: {}", e))?;
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

fn handle_command(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    user_id: &str,
    cmd: GatewayCommand,
    subscriptions: &mut Subscriptions,
    out_tx: &mpsc::UnboundedSender<GatewayEvent>,
) {
    match cmd {
        GatewayCommand::Subscribe { id, path } => {
            let node = match NodePath::parse(&path) {
                Ok(node) => node,
                Err(e) => {
                    let _ = out_tx.send(GatewayEvent::Error {
                        id: Some(id),
                        message: e.to_string(),
                    });
                    return;
                }
            };

            trace!("{} subscribing #{} to {}", user_id, id, node);
            let task = spawn_forwarder(dispatcher, db, id, node, path, out_tx.clone());
            subscriptions.insert(id, task);
        }

        GatewayCommand::Unsubscribe { id } => {
            trace!("{} unsubscribing #{}", user_id, id);
            subscriptions.remove(id);
        }
    }
}

/// Forward every value of a watch on `node` to the connection as `Value` events.
fn spawn_forwarder(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    id: u64,
    node: NodePath,
    path: String,
    out: mpsc::UnboundedSender<GatewayEvent>,
) -> JoinHandle<()> {
    let mut watch = dispatcher.watch(db.clone(), node);
    tokio::spawn(async move {
        while let Some(item) = watch.next().await {
            let event = match item {
                Ok(value) => GatewayEvent::Value {
                    id,
                    path: path.clone(),
                    value,
                },
                Err(e) => GatewayEvent::Error {
                    id: Some(id),
                    message: e.to_string(),
                },
            };
            if out.send(event).is_err() {
                break;
            }
        }
    })
}

/// Forwarder tasks of one connection, keyed by subscription id. Every task
/// is aborted when the set is dropped.
#[derive(Default)]
struct Subscriptions {
    tasks: HashMap<u64, JoinHandle<()>>,
}

impl Subscriptions {
    /// Re-using an id replaces the previous subscription.
    fn insert(&mut self, id: u64, task: JoinHandle<()>) {
        if let Some(previous) = self.tasks.insert(id, task) {
            previous.abort();
        }
    }

    fn remove(&mut self, id: u64) {
        if let Some(task) = self.tasks.remove(&id) {
            task.abort();
        }
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}
