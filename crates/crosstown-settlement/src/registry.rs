//! Shared channel table: a `Channel` record is read by both the bootstrap
//! state machine and the BLS/settlement path, but mutated only by the
//! connector adapter that owns the channel's on-chain lifecycle.
//!
//! `Arc<RwLock<HashMap<...>>>` mirrors `openibank-settlement::InMemoryChannel`'s
//! balance-table idiom: one shared map behind a single lock, cloned out to
//! callers rather than handed out by reference.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crosstown_types::{Channel, ChannelState};

#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, Channel>>,
}

impl ChannelRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn insert(&self, channel: Channel) {
        self.channels.write().await.insert(channel.channel_id.clone(), channel);
    }

    pub async fn get(&self, channel_id: &str) -> Option<Channel> {
        self.channels.read().await.get(channel_id).cloned()
    }

    pub async fn set_state(&self, channel_id: &str, state: ChannelState) -> bool {
        let mut channels = self.channels.write().await;
        match channels.get_mut(channel_id) {
            Some(channel) => {
                channel.state = state;
                true
            }
            None => false,
        }
    }

    pub async fn is_open(&self, channel_id: &str) -> bool {
        matches!(self.get(channel_id).await, Some(c) if c.state == ChannelState::Open)
    }
}
