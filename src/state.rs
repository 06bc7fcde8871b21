use std::sync::Arc;

use crate::{broadcast::Broadcaster, channel::ChannelRegistry};

#[derive(Clone)]
pub struct AppState {
    pub broadcaster: Broadcaster,
    pub channels: Arc<ChannelRegistry>,
}

impl AppState {
    pub fn new(channel_capacity: usize) -> Self {
        Self::with_registry(Broadcaster::new(channel_capacity), ChannelRegistry::chat())
    }

    pub fn with_registry(broadcaster: Broadcaster, channels: ChannelRegistry) -> Self {
        Self {
            broadcaster,
            channels: Arc::new(channels),
        }
    }
}
