use sha2::{Digest, Sha256};

use crosstown_types::SignedEvent;

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Canonical serialization hashed to produce `event.id`: the ordered tuple
/// `(pubkey, created_at, kind, tags, content)` as compact JSON, matching the
/// Nostr NIP-01 id-derivation convention (here generalized to this node's
/// own tag/content shape rather than the full NIP-01 array form).
pub fn event_id(pubkey: &str, created_at: i64, kind: u32, tags: &[Vec<String>], content: &str) -> String {
    let canonical = serde_json::json!([0, pubkey, created_at, kind, tags, content]);
    let bytes = serde_json::to_vec(&canonical).expect("canonical json never fails to serialize");
    sha256_hex(&bytes)
}

pub fn recompute_id(event: &SignedEvent) -> String {
    event_id(&event.pubkey, event.created_at, event.kind, &event.tags, &event.content)
}

/// `fulfillment = SHA-256(ascii(event.id))`, returned to the packet sender as
/// proof the event was accepted.
pub fn fulfillment(event_id_hex: &str) -> [u8; 32] {
    sha256(event_id_hex.as_bytes())
}

/// Canonical digest signed by `signClaim`/checked by `verifyClaim` over
/// `(channelId, nonce, amount)`. Shared between `crosstown-bls` (which
/// only needs to authenticate an inbound claim sidecar) and
/// `crosstown-settlement` (which owns claim issuance), so both agree on
/// exactly what bytes a claim signature covers.
pub fn claim_digest(channel_id: &str, nonce: u64, amount: u64) -> String {
    let canonical = serde_json::json!([1, channel_id, nonce, amount]);
    let bytes = serde_json::to_vec(&canonical).expect("canonical json never fails to serialize");
    sha256_hex(&bytes)
}
