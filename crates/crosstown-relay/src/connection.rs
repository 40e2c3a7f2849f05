//! Per-connection subscription bookkeeping and its state machine.
//!
//! `ConnectionState` mirrors `resonancex_ws::ConnectionState`'s
//! `{id, channels, ...}` shape, generalized from a flat channel set to a
//! `subId -> filters` map plus a dedupe set per subscription (so a live
//! event racing a history replay is never forwarded twice).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crosstown_types::Filter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connected,
    StreamingHistory,
    StreamingLive,
    Closed,
}

impl ConnectionPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionPhase::StreamingHistory,
            2 => ConnectionPhase::StreamingLive,
            3 => ConnectionPhase::Closed,
            _ => ConnectionPhase::Connected,
        }
    }
}

struct SubState {
    filters: Vec<Filter>,
    sent_ids: HashSet<String>,
}

/// Shared, lock-guarded subscription table for one connection. Cheap to clone
/// (it's an `Arc` underneath); the inbound-frame handler and the live
/// fan-out task each hold a clone.
#[derive(Clone)]
pub struct ConnectionState {
    pub id: String,
    subs: Arc<RwLock<HashMap<String, SubState>>>,
    phase: Arc<AtomicU8>,
}

impl ConnectionState {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), subs: Arc::new(RwLock::new(HashMap::new())), phase: Arc::new(AtomicU8::new(0)) }
    }

    pub fn phase(&self) -> ConnectionPhase {
        ConnectionPhase::from_u8(self.phase.load(Ordering::Relaxed))
    }

    pub fn set_phase(&self, phase: ConnectionPhase) {
        self.phase.store(phase as u8, Ordering::Relaxed);
    }

    /// Registers `sub_id` with `filters`, implicitly closing any prior
    /// subscription of the same id.
    pub async fn open_subscription(&self, sub_id: &str, filters: Vec<Filter>) {
        self.subs.write().await.insert(sub_id.to_string(), SubState { filters, sent_ids: HashSet::new() });
    }

    pub async fn close_subscription(&self, sub_id: &str) {
        self.subs.write().await.remove(sub_id);
    }

    /// Marks `event_id` sent for `sub_id` if it hasn't been already. Returns
    /// `true` if this call is the one that should emit the frame.
    pub async fn mark_sent_if_new(&self, sub_id: &str, event_id: &str) -> bool {
        let mut subs = self.subs.write().await;
        match subs.get_mut(sub_id) {
            Some(state) => state.sent_ids.insert(event_id.to_string()),
            None => false,
        }
    }

    /// Every `(subId, filters)` pair still open on this connection, for the
    /// live fan-out task to test a freshly-stored event against.
    pub async fn open_filters(&self) -> Vec<(String, Vec<Filter>)> {
        self.subs.read().await.iter().map(|(id, state)| (id.clone(), state.filters.clone())).collect()
    }

    pub async fn subscription_count(&self) -> usize {
        self.subs.read().await.len()
    }
}
