use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Settlement + endpoint data a peer publishes about itself (kind 10032 content).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub ilp_address: String,
    pub btp_endpoint: String,
    pub asset_code: String,
    pub asset_scale: u8,
    pub supported_chains: Vec<String>,
    pub settlement_addresses: HashMap<String, String>,
    pub preferred_tokens: HashMap<String, String>,
    pub token_networks: HashMap<String, String>,
}

/// Seed record loaded from genesis configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownPeer {
    pub pubkey: String,
    pub relay_url: String,
    pub btp_endpoint: String,
}

/// Produced by listening for peer-info events during discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredPeer {
    pub pubkey: String,
    pub peer_info: PeerInfo,
    pub discovered_at: i64,
}
