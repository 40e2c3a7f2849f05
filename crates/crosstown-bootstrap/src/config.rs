//! Static configuration the bootstrap state machine is seeded with.
//!
//! Field/timeout defaults follow the `lumen-p2p` bootstrap module's
//! `BootstrapConfig` (min/max peers, discovery window, per-step timeouts);
//! the settlement-handshake fields (`supported_chains`, `settlement_addresses`,
//! `preferred_tokens`) are this node's own contribution, carried in the
//! kind-23194/23195 handshake content.

use std::collections::HashMap;
use std::time::Duration;

use crosstown_types::KnownPeer;

/// Genesis peer list plus the local identity a node advertises during the
/// handshake and announce phases.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub known_peers: Vec<KnownPeer>,
    /// How long `discovering` waits for peer-info events before moving on,
    /// provided at least one peer is already known.
    pub discovery_window: Duration,
    /// Discovery stops early once this many peers have been found.
    pub min_peers: usize,
    pub handshake_timeout: Duration,
    /// Upper bound on how long `stop()` waits for outstanding work to unwind.
    pub shutdown_budget: Duration,
    pub supported_chains: Vec<String>,
    pub settlement_addresses: HashMap<String, String>,
    pub preferred_tokens: HashMap<String, String>,
    pub local_ilp_address: String,
    pub local_btp_endpoint: String,
    pub default_deposit: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            known_peers: Vec::new(),
            discovery_window: Duration::from_secs(5),
            min_peers: 1,
            handshake_timeout: Duration::from_secs(10),
            shutdown_budget: Duration::from_secs(5),
            supported_chains: Vec::new(),
            settlement_addresses: HashMap::new(),
            preferred_tokens: HashMap::new(),
            local_ilp_address: String::new(),
            local_btp_endpoint: String::new(),
            default_deposit: 0,
        }
    }
}
