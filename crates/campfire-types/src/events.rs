use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::paths::NodePath;

/// Published by the backend after every successful write.
#[derive(Debug, Clone)]
pub struct NodeChanged {
    pub path: NodePath,
}

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is authenticated
    Ready { user_id: String },

    /// Full current value of a subscribed path. Sent once on subscribe and
    /// again after every change at, above or below the path.
    Value {
        id: u64,
        path: String,
        value: Option<Value>,
    },

    /// A command could not be served
    Error { id: Option<u64>, message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Start a live subscription. `id` is chosen by the client and echoed
    /// back on every `Value` event.
    Subscribe { id: u64, path: String },

    /// Stop a live subscription
    Unsubscribe { id: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_tagged() {
        let cmd = GatewayCommand::Subscribe {
            id: 7,
            path: "sessions/camp21/activities".into(),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "Subscribe");
        assert_eq!(json["data"]["id"], 7);
    }
}
