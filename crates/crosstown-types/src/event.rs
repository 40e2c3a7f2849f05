use serde::{Deserialize, Serialize};

/// A single tag row: an ordered list of strings, first element is the tag name.
pub type Tag = Vec<String>;

/// The universal on-wire record: a Nostr-style signed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEvent {
    /// 32-byte hash, hex-encoded: sha256 of the canonical serialization of
    /// (pubkey, created_at, kind, tags, content).
    pub id: String,
    /// 32-byte author public key, hex-encoded.
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u32,
    pub tags: Vec<Tag>,
    pub content: String,
    /// 64-byte Schnorr signature over `id`, hex-encoded.
    pub sig: String,
}

impl SignedEvent {
    /// First element of the first tag named `"d"`, or `""` if absent.
    pub fn d_tag_value(&self) -> String {
        self.tags
            .iter()
            .find(|t| t.first().map(|n| n == "d").unwrap_or(false))
            .and_then(|t| t.get(1))
            .cloned()
            .unwrap_or_default()
    }

    pub fn tag_values(&self, name: char) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|t| t.first().map(|n| n.len() == 1 && n.starts_with(name)).unwrap_or(false))
            .filter_map(|t| t.get(1))
            .map(|s| s.as_str())
            .collect()
    }
}

/// Category a kind falls into, per the replaceable-event rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindCategory {
    Regular,
    Replaceable,
    Ephemeral,
    Addressable,
}

pub fn kind_category(kind: u32) -> KindCategory {
    match kind {
        10_000..=19_999 => KindCategory::Replaceable,
        20_000..=29_999 => KindCategory::Ephemeral,
        30_000..=39_999 => KindCategory::Addressable,
        _ => KindCategory::Regular,
    }
}

/// A SignedEvent plus the local receipt timestamp. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    #[serde(flatten)]
    pub event: SignedEvent,
    pub received_at: i64,
}

/// Recognized event kinds.
pub mod kinds {
    pub const METADATA: u32 = 0;
    pub const NOTE: u32 = 1;
    pub const FOLLOW_LIST: u32 = 3;
    pub const PEER_INFO: u32 = 10032;
    pub const HANDSHAKE_REQUEST: u32 = 23194;
    pub const HANDSHAKE_RESPONSE: u32 = 23195;
}
