//! JSON content carried inside the kind-23194/23195 handshake events.
//!
//! These are local to this crate rather than `crosstown-types`: nothing
//! outside the handshake step needs to know their shape, unlike
//! [`crosstown_types::PeerInfo`], which is also read by discovery.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Content of a kind-23194 (`HANDSHAKE_REQUEST`) event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub request_id: String,
    pub supported_chains: Vec<String>,
    pub settlement_addresses: HashMap<String, String>,
    pub preferred_tokens: HashMap<String, String>,
}

/// Content of a kind-23195 (`HANDSHAKE_RESPONSE`) event, addressed back to
/// the requester via a `["e", requestId]` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeResponse {
    pub request_id: String,
    pub supported_chains: Vec<String>,
    pub settlement_addresses: HashMap<String, String>,
    pub preferred_tokens: HashMap<String, String>,
}

impl HandshakeResponse {
    /// First chain in `our_preference` also present in the peer's
    /// `supported_chains`, paired with the peer's settlement address and
    /// preferred token for that chain.
    pub fn negotiate_chain(&self, our_preference: &[String]) -> Option<NegotiatedChain> {
        let chain = our_preference.iter().find(|c| self.supported_chains.contains(c))?;
        let peer_address = self.settlement_addresses.get(chain)?;
        let token = self.preferred_tokens.get(chain).cloned().unwrap_or_default();
        Some(NegotiatedChain { chain: chain.clone(), peer_address: peer_address.clone(), token })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedChain {
    pub chain: String,
    pub peer_address: String,
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(chains: &[&str]) -> HandshakeResponse {
        let mut settlement_addresses = HashMap::new();
        let mut preferred_tokens = HashMap::new();
        for c in chains {
            settlement_addresses.insert(c.to_string(), format!("{c}-address"));
            preferred_tokens.insert(c.to_string(), format!("{c}-token"));
        }
        HandshakeResponse {
            request_id: "req1".to_string(),
            supported_chains: chains.iter().map(|s| s.to_string()).collect(),
            settlement_addresses,
            preferred_tokens,
        }
    }

    #[test]
    fn negotiate_chain_picks_first_preference_the_peer_also_supports() {
        let resp = response(&["ethereum", "solana"]);
        let negotiated = resp.negotiate_chain(&["solana".to_string(), "ethereum".to_string()]).unwrap();
        assert_eq!(negotiated.chain, "solana");
        assert_eq!(negotiated.peer_address, "solana-address");
    }

    #[test]
    fn negotiate_chain_is_none_without_overlap() {
        let resp = response(&["ethereum"]);
        assert!(resp.negotiate_chain(&["solana".to_string()]).is_none());
    }
}
