//! Per-kind, per-byte pricing of events, with an owner bypass list and a
//! configurable set of "free handshake" kinds.
//!
//! Mirrors `resonancex-fees`'s tier-row-with-fallback shape: a lookup table
//! keyed by a discriminant (there, [`FeeTier`]; here, event `kind`) plus one
//! default row for anything not explicitly configured.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crosstown_types::SignedEvent;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PricingError {
    #[error("invalid event: {0}")]
    InvalidEvent(String),
}

pub type PricingResult<T> = Result<T, PricingError>;

/// `price(kind) = base + perByte * size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KindRow {
    pub base: u64,
    pub per_byte: u64,
}

/// Startup-configured pricing policy. Immutable after construction; callers
/// wrap it in an `Arc` to share across the BLS handler's worker tasks.
#[derive(Debug, Clone)]
pub struct PricingPolicy {
    rows: HashMap<u32, KindRow>,
    default_row: KindRow,
    owner_bypass: HashSet<String>,
    free_handshake_kinds: HashSet<u32>,
}

impl PricingPolicy {
    pub fn new(rows: HashMap<u32, KindRow>, default_row: KindRow) -> Self {
        Self { rows, default_row, owner_bypass: HashSet::new(), free_handshake_kinds: HashSet::new() }
    }

    pub fn with_owner_bypass(mut self, pubkeys: impl IntoIterator<Item = String>) -> Self {
        self.owner_bypass = pubkeys.into_iter().collect();
        self
    }

    pub fn with_free_handshake_kinds(mut self, kinds: impl IntoIterator<Item = u32>) -> Self {
        self.free_handshake_kinds = kinds.into_iter().collect();
        self
    }

    /// Nostr's standard handshake kinds (23194/23195), priced free by
    /// default under the "handshake carried on the data plane" policy.
    pub fn with_default_free_handshake_kinds(self) -> Self {
        self.with_free_handshake_kinds([
            crosstown_types::kinds::HANDSHAKE_REQUEST,
            crosstown_types::kinds::HANDSHAKE_RESPONSE,
        ])
    }

    pub fn row_for(&self, kind: u32) -> KindRow {
        self.rows.get(&kind).copied().unwrap_or(self.default_row)
    }

    pub fn is_owner_bypassed(&self, pubkey: &str) -> bool {
        self.owner_bypass.contains(pubkey)
    }

    pub fn is_free_handshake_kind(&self, kind: u32) -> bool {
        self.free_handshake_kinds.contains(&kind)
    }

    /// `price(e) = base(kind) + perByte(kind) * size(encode(e))`, or zero
    /// when the event's pubkey is on the owner-bypass list or its kind is a
    /// configured free-handshake kind.
    pub fn price(&self, event: &SignedEvent) -> PricingResult<u64> {
        if self.is_owner_bypassed(&event.pubkey) || self.is_free_handshake_kind(event.kind) {
            return Ok(0);
        }

        let encoded = crosstown_codec::encode(event)
            .map_err(|e| PricingError::InvalidEvent(e.to_string()))?;
        let row = self.row_for(event.kind);
        let size = encoded.len() as u64;
        Ok(row.base.saturating_add(row.per_byte.saturating_mul(size)))
    }
}

impl Default for PricingPolicy {
    /// A permissive fallback (everything free) so a misconfigured node
    /// fails loudly elsewhere rather than silently rejecting every packet.
    fn default() -> Self {
        Self::new(HashMap::new(), KindRow::default())
    }
}
