//! Frames exchanged over the `/ws` transport.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::broadcast::BroadcastEvent;

/// Client -> server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
}

/// Server -> client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    ConnectionEstablished { socket_id: Uuid },
    SubscriptionSucceeded { channel: String },
    /// The join was refused. Clients treat the channel as not connected and do not retry.
    SubscriptionError { channel: String, error: String },
    Event(BroadcastEvent),
    Error { message: String },
}
