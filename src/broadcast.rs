//! In-process pub/sub hub.
//!
//! Each channel name maps to one `tokio::sync::broadcast` sender, created on
//! first subscribe. Emission never waits on subscribers: an event published to
//! a channel without receivers is dropped, and a receiver that falls more than
//! `capacity` events behind skips the oldest ones.

use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::broadcast;
use tracing::debug;

use crate::message::ChatMessage;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// The one event type carried on the chat channel.
pub const MESSAGE_SENT: &str = "MessageSent";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct BroadcastEvent {
    pub channel: String,
    pub event: String,
    pub data: ChatMessage,
}

impl BroadcastEvent {
    pub fn message_sent(channel: &str, message: ChatMessage) -> Self {
        Self {
            channel: channel.to_owned(),
            event: String::from(MESSAGE_SENT),
            data: message,
        }
    }
}

pub type EventReceiver = broadcast::Receiver<Arc<BroadcastEvent>>;

#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Hub>,
}

struct Hub {
    capacity: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<Arc<BroadcastEvent>>>>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Hub {
                capacity: capacity.max(1),
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Publishes `event` on its channel and returns how many receivers it reached.
    pub fn emit(&self, event: BroadcastEvent) -> usize {
        let mut channels = self.channels();
        let channel = event.channel.clone();

        let Some(tx) = channels.get(&channel) else {
            debug!(channel, "no subscribers, event dropped");
            return 0;
        };

        match tx.send(Arc::new(event)) {
            Ok(receivers) => receivers,
            Err(_) => {
                channels.remove(&channel);
                debug!(channel, "no subscribers, event dropped");
                0
            }
        }
    }

    /// Returns a receiver that sees every event emitted on `channel` from now on.
    pub fn subscribe(&self, channel: &str) -> EventReceiver {
        let mut channels = self.channels();
        let capacity = self.inner.capacity;

        channels
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe()
    }

    /// Forgets `channel` once its last receiver is gone.
    pub fn release(&self, channel: &str) {
        let mut channels = self.channels();

        if channels
            .get(channel)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            channels.remove(channel);
            debug!(channel, "channel released");
        }
    }

    /// Whether `channel` currently has a sender in the hub.
    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels().contains_key(channel)
    }

    pub fn receiver_count(&self, channel: &str) -> usize {
        self.channels()
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<Arc<BroadcastEvent>>>> {
        self.inner
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}
