use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Opening,
    Open,
    Closed,
    Settled,
}

/// Created during bootstrap handshake; mutated only by the connector adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// 32-byte hash, hex-encoded.
    pub channel_id: String,
    pub chain: String,
    pub peer_address: String,
    pub local_address: String,
    pub token_address: String,
    pub deposit: u64,
    pub state: ChannelState,
}

/// `{channelId, nonce, amount, signature}`. Totally ordered per
/// `(channelId, signer)` by nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedClaim {
    pub channel_id: String,
    pub nonce: u64,
    pub amount: u64,
    /// 64-byte Schnorr signature, hex-encoded.
    pub signature: String,
}
