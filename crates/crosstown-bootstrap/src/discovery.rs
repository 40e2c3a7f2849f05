//! Discovery phase: dial each known peer's relay directly and
//! collect the kind-10032 peer-info event it serves back.
//!
//! Grounded in the `deadcat` discovery service's relay-subscription-plus-
//! timeout pattern: open a subscription, read until `EOSE` or the window
//! elapses, tear the socket down either way. Speaks `crosstown-relay`'s own
//! `REQ`/`EVENT`/`EOSE` frames as a client, via `tokio-tungstenite` rather
//! than `axum` (which only serves the relay side of that protocol).

use std::time::Duration;

use futures_util::stream::FuturesUnordered;
use futures_util::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crosstown_relay::{ClientFrame, ServerFrame};
use crosstown_types::{kinds, DiscoveredPeer, Filter, KnownPeer, PeerInfo};

/// Dials every `known_peers` relay concurrently, each bounded by `window`,
/// and returns peer-info events collected along the way. Stops early, ahead
/// of the other dials, once `min_peers` distinct peers have been discovered;
/// a single unreachable or unresponsive peer never fails the others.
pub async fn discover_peers(known_peers: &[KnownPeer], window: Duration, min_peers: usize) -> Vec<DiscoveredPeer> {
    let mut dials: FuturesUnordered<_> =
        known_peers.iter().map(|peer| dial_one(peer.clone(), window)).collect();

    let mut discovered = Vec::new();
    while let Some(found) = dials.next().await {
        discovered.extend(found);
        if min_peers > 0 && discovered.len() >= min_peers {
            debug!(count = discovered.len(), min_peers, "discovery reached minimum peer count, not waiting on the rest");
            break;
        }
    }
    discovered
}

async fn dial_one(peer: KnownPeer, window: Duration) -> Vec<DiscoveredPeer> {
    match timeout(window, dial_one_inner(&peer)).await {
        Ok(Ok(discovered)) => discovered,
        Ok(Err(e)) => {
            warn!(relay_url = %peer.relay_url, error = %e, "discovery dial failed");
            Vec::new()
        }
        Err(_) => {
            debug!(relay_url = %peer.relay_url, "discovery window elapsed before EOSE");
            Vec::new()
        }
    }
}

async fn dial_one_inner(peer: &KnownPeer) -> Result<Vec<DiscoveredPeer>, String> {
    let (ws, _response) = tokio_tungstenite::connect_async(&peer.relay_url).await.map_err(|e| e.to_string())?;
    let (mut sink, mut stream) = ws.split();

    let req = ClientFrame::Req {
        sub_id: "discover".to_string(),
        filters: vec![Filter { kinds: vec![kinds::PEER_INFO], ..Default::default() }],
    };
    sink.send(Message::Text(req.to_text().into())).await.map_err(|e| e.to_string())?;

    let mut discovered = Vec::new();
    while let Some(msg) = stream.next().await {
        let msg = msg.map_err(|e| e.to_string())?;
        let Message::Text(text) = msg else { continue };
        match ServerFrame::parse(&text) {
            Ok(ServerFrame::Event { event, .. }) => match serde_json::from_str::<PeerInfo>(&event.content) {
                Ok(peer_info) => discovered.push(DiscoveredPeer {
                    pubkey: event.pubkey.clone(),
                    peer_info,
                    discovered_at: event.created_at,
                }),
                Err(e) => warn!(error = %e, "peer-info event content did not parse"),
            },
            Ok(ServerFrame::Eose { .. }) => break,
            Ok(_) => {}
            Err(e) => warn!(error = %e, "malformed frame during discovery"),
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    Ok(discovered)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crosstown_crypto::{hash::event_id, sign_event, KeyPair};
    use crosstown_store::EventStore;
    use crosstown_types::SignedEvent;

    use super::*;

    async fn spawn_relay() -> String {
        let store = Arc::new(EventStore::connect("sqlite::memory:").await.unwrap());
        let kp = KeyPair::generate();
        let pubkey = kp.public_key().0;
        let peer_info = PeerInfo {
            ilp_address: "g.crosstown.alice".to_string(),
            btp_endpoint: "http://127.0.0.1:9000".to_string(),
            asset_code: "XRP".to_string(),
            asset_scale: 6,
            supported_chains: vec!["ethereum".to_string()],
            settlement_addresses: Default::default(),
            preferred_tokens: Default::default(),
            token_networks: Default::default(),
        };
        let content = serde_json::to_string(&peer_info).unwrap();
        let created_at = 1_700_000_000;
        let id = event_id(&pubkey, created_at, kinds::PEER_INFO, &[], &content);
        let sig = sign_event(&kp, &id).unwrap();
        let event = SignedEvent { id, pubkey, created_at, kind: kinds::PEER_INFO, tags: vec![], content, sig };
        store.put(event).await.unwrap();

        let relay = crosstown_relay::Relay::new(store);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, relay.router()).await.unwrap();
        });
        format!("ws://{addr}/relay")
    }

    #[tokio::test]
    async fn discovers_peer_info_served_by_a_live_relay() {
        let relay_url = spawn_relay().await;
        let peer = KnownPeer { pubkey: "irrelevant".to_string(), relay_url, btp_endpoint: String::new() };

        let discovered = discover_peers(&[peer], Duration::from_secs(2), 1).await;
        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered[0].peer_info.ilp_address, "g.crosstown.alice");
    }

    #[tokio::test]
    async fn unreachable_peer_yields_no_discoveries_without_panicking() {
        let peer = KnownPeer {
            pubkey: "ab".repeat(32),
            relay_url: "ws://127.0.0.1:1/relay".to_string(),
            btp_endpoint: "http://127.0.0.1:1".to_string(),
        };
        let discovered = discover_peers(&[peer], Duration::from_millis(200), 1).await;
        assert!(discovered.is_empty());
    }

    #[tokio::test]
    async fn empty_known_peers_yields_no_discoveries() {
        let discovered = discover_peers(&[], Duration::from_millis(50), 1).await;
        assert!(discovered.is_empty());
    }

    #[tokio::test]
    async fn stops_waiting_once_min_peers_is_reached() {
        let relay_url = spawn_relay().await;
        let live = KnownPeer { pubkey: "irrelevant".to_string(), relay_url, btp_endpoint: String::new() };
        let stuck = KnownPeer {
            pubkey: "ab".repeat(32),
            relay_url: "ws://127.0.0.1:1/relay".to_string(),
            btp_endpoint: "http://127.0.0.1:1".to_string(),
        };

        let started = tokio::time::Instant::now();
        let discovered = discover_peers(&[stuck, live], Duration::from_secs(30), 1).await;
        assert_eq!(discovered.len(), 1);
        assert!(started.elapsed() < Duration::from_secs(5), "should not have waited on the stuck peer's full window");
    }
}
