//! Announce phase: publish our own peer-info event to every
//! handshaken peer, as a paid packet priced by our own policy as a proxy for
//! theirs, retrying once if they quote a higher price back via `F06`.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use thiserror::Error;

use crosstown_codec::{encode_envelope, Envelope};
use crosstown_connector::{ConnectorError, ConnectorRuntime};
use crosstown_crypto::{hash::event_id, sign_event, KeyPair};
use crosstown_pricing::PricingPolicy;
use crosstown_types::{kinds, PacketRequest, PacketResponse, PeerInfo, RejectCode, SignedEvent};

#[derive(Debug, Error)]
pub enum AnnounceError {
    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),
    #[error("peer rejected the announcement after the priced retry: {0}")]
    Rejected(String),
    #[error("could not sign the peer-info event: {0}")]
    Signing(String),
}

/// Builds and signs our own kind-10032 event fresh on every call, so
/// `created_at` always advances and the replaceable-event rule keeps only
/// the latest copy on the receiving end.
fn build_peer_info_event(peer_info: &PeerInfo, keypair: &KeyPair) -> Result<SignedEvent, AnnounceError> {
    let content = serde_json::to_string(peer_info).expect("peer info always serializes");
    let pubkey = keypair.public_key().0;
    let created_at = chrono::Utc::now().timestamp();
    let id = event_id(&pubkey, created_at, kinds::PEER_INFO, &[], &content);
    let sig = sign_event(keypair, &id).map_err(|e| AnnounceError::Signing(e.to_string()))?;
    Ok(SignedEvent { id, pubkey, created_at, kind: kinds::PEER_INFO, tags: vec![], content, sig })
}

/// Sends our peer-info event to `peer_ilp_address`, priced via `pricing` as
/// a proxy for the peer's own policy; retries exactly once at the peer's
/// quoted price if rejected with `F06`.
pub async fn announce_to_peer(
    peer_ilp_address: &str,
    peer_info: &PeerInfo,
    keypair: &KeyPair,
    pricing: &Arc<PricingPolicy>,
    runtime: &Arc<dyn ConnectorRuntime>,
) -> Result<(), AnnounceError> {
    let event = build_peer_info_event(peer_info, keypair)?;
    let amount = pricing.price(&event).unwrap_or(0);
    let data = BASE64.encode(encode_envelope(&Envelope::Event(event)).expect("event always encodes"));

    let req = PacketRequest { amount, destination: peer_ilp_address.to_string(), data: data.clone(), source_account: None };
    match runtime.send_ilp_packet(req).await? {
        PacketResponse::Accept { .. } => return Ok(()),
        PacketResponse::Reject { code: RejectCode::F06, required: Some(required), .. } => {
            let retry = PacketRequest { amount: required, destination: peer_ilp_address.to_string(), data, source_account: None };
            match runtime.send_ilp_packet(retry).await? {
                PacketResponse::Accept { .. } => Ok(()),
                PacketResponse::Reject { message, .. } => Err(AnnounceError::Rejected(message)),
            }
        }
        PacketResponse::Reject { message, .. } => Err(AnnounceError::Rejected(message)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crosstown_bls::Bls;
    use crosstown_connector::EmbeddedConnector;
    use crosstown_pricing::KindRow;
    use crosstown_settlement::ChannelRegistry;
    use crosstown_store::EventStore;

    use super::*;

    fn info() -> PeerInfo {
        PeerInfo {
            ilp_address: "g.crosstown.alice".to_string(),
            btp_endpoint: "http://127.0.0.1:9000".to_string(),
            asset_code: "XRP".to_string(),
            asset_scale: 6,
            supported_chains: vec!["ethereum".to_string()],
            settlement_addresses: HashMap::new(),
            preferred_tokens: HashMap::new(),
            token_networks: HashMap::new(),
        }
    }

    async fn bob(base: u64) -> Arc<EmbeddedConnector> {
        let store = Arc::new(EventStore::connect("sqlite::memory:").await.unwrap());
        let pricing = Arc::new(PricingPolicy::new(HashMap::new(), KindRow { base, per_byte: 0 }));
        let bls = Arc::new(Bls::new(store, pricing));
        Arc::new(EmbeddedConnector::new("g.crosstown.bob", bls, ChannelRegistry::new()))
    }

    #[tokio::test]
    async fn announce_succeeds_when_our_price_already_covers_the_peers_quote() {
        let bob = bob(0).await;
        let alice = Arc::new(EmbeddedConnector::new("g.crosstown.alice", Arc::new(Bls::new(
            Arc::new(EventStore::connect("sqlite::memory:").await.unwrap()),
            Arc::new(PricingPolicy::new(HashMap::new(), KindRow::default())),
        )), ChannelRegistry::new()));
        alice.register_peer_runtime("g.crosstown.bob", bob.clone());
        let runtime: Arc<dyn ConnectorRuntime> = alice.clone();

        let keypair = KeyPair::generate();
        let pricing = Arc::new(PricingPolicy::new(HashMap::new(), KindRow::default()));
        announce_to_peer("g.crosstown.bob", &info(), &keypair, &pricing, &runtime).await.unwrap();
    }

    #[tokio::test]
    async fn announce_retries_once_at_the_peers_quoted_price() {
        let bob = bob(500).await;
        let alice = Arc::new(EmbeddedConnector::new("g.crosstown.alice", Arc::new(Bls::new(
            Arc::new(EventStore::connect("sqlite::memory:").await.unwrap()),
            Arc::new(PricingPolicy::new(HashMap::new(), KindRow::default())),
        )), ChannelRegistry::new()));
        alice.register_peer_runtime("g.crosstown.bob", bob.clone());
        let runtime: Arc<dyn ConnectorRuntime> = alice.clone();

        let keypair = KeyPair::generate();
        // Our own policy quotes zero, below bob's 500 base price: the
        // first attempt must be rejected with F06 and retried at 500.
        let pricing = Arc::new(PricingPolicy::new(HashMap::new(), KindRow::default()));
        announce_to_peer("g.crosstown.bob", &info(), &keypair, &pricing, &runtime).await.unwrap();
    }
}
