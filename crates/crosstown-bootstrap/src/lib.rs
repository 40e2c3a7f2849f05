//! Bootstrap state machine: drives a node from cold start to
//! participating in the payment-routed relay fabric, through
//! `discovering -> registering -> handshaking -> announcing -> ready`
//! (or `failed` at any point).
//!
//! Grounded in the `lumen-p2p` bootstrap module's phase-sequenced
//! peer-discovery loop (config shape, per-phase counters) and the
//! `deadcat` discovery service's subscribe-then-timeout idiom; the
//! channel-open/settlement-handshake steps reuse `openibank-bridge`'s
//! `BridgeExecutor` trait shape generalized to this spec's SPSP-style
//! handshake. Advisory phase events are emitted over a
//! `tokio::sync::broadcast` channel, the same primitive
//! `openibank_api::websocket` uses for its own fan-out.

pub mod announce;
pub mod config;
pub mod discovery;
pub mod error;
pub mod handshake;
pub mod wire;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crosstown_connector::{ConnectorAdmin, ConnectorChannel, ConnectorRuntime, PeerRegistration, Route};
use crosstown_crypto::KeyPair;
use crosstown_pricing::PricingPolicy;
use crosstown_store::EventStore;
use crosstown_types::{BootstrapEvent, BootstrapPhase, DiscoveredPeer, KnownPeer, PeerInfo};

pub use config::BootstrapConfig;
pub use error::{BootstrapError, BootstrapResult};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Bookkeeping for one peer across the registering/handshaking/announcing
/// micro-flow. `peer_info` is only populated once discovery (or a later
/// `ready`-phase peer-info event) actually produced one; a peer known only
/// from configuration without a successful discovery dial still registers,
/// but can't handshake or be announced to without chain/settlement data.
#[derive(Debug, Clone)]
struct PeerRecord {
    pubkey: String,
    btp_endpoint: String,
    peer_info: Option<PeerInfo>,
    registered: bool,
    channel_id: Option<String>,
    chain: Option<String>,
}

impl PeerRecord {
    fn from_known(known: &KnownPeer) -> Self {
        Self { pubkey: known.pubkey.clone(), btp_endpoint: known.btp_endpoint.clone(), peer_info: None, registered: false, channel_id: None, chain: None }
    }

    fn from_discovered(discovered: &DiscoveredPeer) -> Self {
        Self {
            pubkey: discovered.pubkey.clone(),
            btp_endpoint: discovered.peer_info.btp_endpoint.clone(),
            peer_info: Some(discovered.peer_info.clone()),
            registered: false,
            channel_id: None,
            chain: None,
        }
    }

    fn route_prefix(&self) -> String {
        self.peer_info.as_ref().map(|p| p.ilp_address.clone()).unwrap_or_else(|| self.pubkey.clone())
    }
}

fn atomic_phase(v: u8) -> BootstrapPhase {
    match v {
        1 => BootstrapPhase::Registering,
        2 => BootstrapPhase::Handshaking,
        3 => BootstrapPhase::Announcing,
        4 => BootstrapPhase::Ready,
        5 => BootstrapPhase::Failed,
        _ => BootstrapPhase::Discovering,
    }
}

fn phase_ordinal(phase: BootstrapPhase) -> u8 {
    match phase {
        BootstrapPhase::Discovering => 0,
        BootstrapPhase::Registering => 1,
        BootstrapPhase::Handshaking => 2,
        BootstrapPhase::Announcing => 3,
        BootstrapPhase::Ready => 4,
        BootstrapPhase::Failed => 5,
    }
}

/// Drives the 5-phase bootstrap flow for one node. Cheap to clone (an
/// `Arc` underneath); `stop()` can be called from a task holding a
/// different clone than the one running `run()`.
pub struct Bootstrap {
    config: BootstrapConfig,
    keypair: Arc<KeyPair>,
    store: Arc<EventStore>,
    pricing: Arc<PricingPolicy>,
    runtime: Arc<dyn ConnectorRuntime>,
    admin: Arc<dyn ConnectorAdmin>,
    channel: Arc<dyn ConnectorChannel>,
    phase: Arc<AtomicU8>,
    events: broadcast::Sender<BootstrapEvent>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl Bootstrap {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: BootstrapConfig,
        keypair: Arc<KeyPair>,
        store: Arc<EventStore>,
        pricing: Arc<PricingPolicy>,
        runtime: Arc<dyn ConnectorRuntime>,
        admin: Arc<dyn ConnectorAdmin>,
        channel: Arc<dyn ConnectorChannel>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Arc::new(Self { config, keypair, store, pricing, runtime, admin, channel, phase: Arc::new(AtomicU8::new(0)), events, cancel_tx, cancel_rx })
    }

    pub fn phase(&self) -> BootstrapPhase {
        atomic_phase(self.phase.load(Ordering::Relaxed))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<BootstrapEvent> {
        self.events.subscribe()
    }

    /// Requests cancellation; `run()` stops advancing at the next checkpoint
    /// and finalizes in `Failed` within `config.shutdown_budget`.
    pub fn stop(&self) {
        let _ = self.cancel_tx.send(true);
    }

    fn cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    fn transition(&self, next: BootstrapPhase) {
        let current = self.phase();
        if !current.can_transition_to(next) {
            warn!(?current, ?next, "ignoring an illegal bootstrap phase transition");
            return;
        }
        self.phase.store(phase_ordinal(next), Ordering::Relaxed);
        info!(?next, "bootstrap phase transition");
    }

    fn emit(&self, event: BootstrapEvent) {
        let _ = self.events.send(event);
    }

    fn fail(&self, reason: impl Into<String>) -> BootstrapError {
        let reason = reason.into();
        self.transition(BootstrapPhase::Failed);
        self.emit(BootstrapEvent::Failed { reason: reason.clone() });
        warn!(reason, "bootstrap failed");
        BootstrapError::NoPeersAvailable
    }

    /// Runs the full flow once, to a terminal phase (`Ready` or `Failed`).
    /// A single peer's registration/handshake/announce failure never aborts
    /// the run as long as at least one other peer succeeds at that step.
    pub async fn run(&self) -> BootstrapResult<()> {
        self.emit(BootstrapEvent::Discovering);
        let discovered = discovery::discover_peers(&self.config.known_peers, self.config.discovery_window, self.config.min_peers).await;
        info!(discovered = discovered.len(), known = self.config.known_peers.len(), "discovery phase complete");

        if discovered.is_empty() && self.config.known_peers.is_empty() {
            return Err(self.fail("no peer discovered and none known"));
        }

        let discovered_by_pubkey: HashMap<String, DiscoveredPeer> =
            discovered.into_iter().map(|d| (d.pubkey.clone(), d)).collect();
        let mut peers = build_peer_records(&discovered_by_pubkey, &self.config.known_peers);

        self.transition(BootstrapPhase::Registering);
        if self.cancelled() {
            return Err(self.fail("cancelled during registering"));
        }
        self.register_all(&mut peers).await;
        if !peers.iter().any(|p| p.registered) {
            return Err(self.fail("no peer registered successfully"));
        }

        self.transition(BootstrapPhase::Handshaking);
        self.emit(BootstrapEvent::Handshaking);
        for peer in peers.iter_mut().filter(|p| p.registered) {
            if self.cancelled() {
                return Err(self.fail("cancelled during handshaking"));
            }
            let Some(discovered) = discovered_by_pubkey.get(&peer.pubkey) else { continue };
            self.handshake_one(peer, discovered).await;
        }
        if !peers.iter().any(|p| p.channel_id.is_some()) {
            return Err(self.fail("no peer completed the handshake"));
        }

        self.transition(BootstrapPhase::Announcing);
        self.emit(BootstrapEvent::Announcing);
        for peer in peers.iter().filter(|p| p.channel_id.is_some()) {
            if self.cancelled() {
                return Err(self.fail("cancelled during announcing"));
            }
            self.announce_one(peer).await;
        }

        self.transition(BootstrapPhase::Ready);
        self.emit(BootstrapEvent::Ready);
        Ok(())
    }

    async fn register_all(&self, peers: &mut [PeerRecord]) {
        for peer in peers.iter_mut() {
            self.emit(BootstrapEvent::Registering { peer_id: peer.pubkey.clone() });
            let registration = PeerRegistration {
                peer_id: peer.pubkey.clone(),
                btp_endpoint: peer.btp_endpoint.clone(),
                routes: vec![Route { prefix: peer.route_prefix(), priority: 0 }],
                auth_token: String::new(),
            };
            match self.admin.add_peer(registration).await {
                Ok(()) => {
                    peer.registered = true;
                    self.emit(BootstrapEvent::PeerRegistered { peer_id: peer.pubkey.clone() });
                }
                Err(e) => warn!(peer_id = %peer.pubkey, error = %e, "peer registration failed, dropping from this round"),
            }
        }
    }

    async fn handshake_one(&self, peer: &mut PeerRecord, discovered: &DiscoveredPeer) {
        let notify = self.store.subscribe();
        let outcome = handshake::handshake_with_peer(
            discovered,
            &self.config.supported_chains,
            &self.config.settlement_addresses,
            &self.config.preferred_tokens,
            self.config.default_deposit,
            &self.keypair,
            &self.runtime,
            &self.channel,
            notify,
            self.config.handshake_timeout,
        )
        .await;

        match outcome {
            Ok(outcome) => {
                peer.channel_id = Some(outcome.channel_id.clone());
                peer.chain = Some(outcome.chain);
                self.emit(BootstrapEvent::ChannelOpened { peer_id: peer.pubkey.clone(), channel_id: outcome.channel_id });
            }
            Err(e) => warn!(peer_id = %peer.pubkey, error = %e, "handshake failed, dropping from this round"),
        }
    }

    async fn announce_one(&self, peer: &PeerRecord) {
        let Some(peer_info) = &peer.peer_info else { return };
        let our_info = PeerInfo {
            ilp_address: self.config.local_ilp_address.clone(),
            btp_endpoint: self.config.local_btp_endpoint.clone(),
            asset_code: peer_info.asset_code.clone(),
            asset_scale: peer_info.asset_scale,
            supported_chains: self.config.supported_chains.clone(),
            settlement_addresses: self.config.settlement_addresses.clone(),
            preferred_tokens: self.config.preferred_tokens.clone(),
            token_networks: HashMap::new(),
        };
        match announce::announce_to_peer(&peer_info.ilp_address, &our_info, &self.keypair, &self.pricing, &self.runtime).await {
            Ok(()) => self.emit(BootstrapEvent::Announced { peer_id: peer.pubkey.clone() }),
            Err(e) => warn!(peer_id = %peer.pubkey, error = %e, "announce failed, dropping from this round"),
        }
    }
}

fn build_peer_records(discovered: &HashMap<String, DiscoveredPeer>, known: &[KnownPeer]) -> Vec<PeerRecord> {
    let mut by_pubkey: HashMap<String, PeerRecord> =
        discovered.iter().map(|(pubkey, d)| (pubkey.clone(), PeerRecord::from_discovered(d))).collect();
    for k in known {
        by_pubkey.entry(k.pubkey.clone()).or_insert_with(|| PeerRecord::from_known(k));
    }
    by_pubkey.into_values().collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use crosstown_bls::Bls;
    use crosstown_connector::EmbeddedConnector;
    use crosstown_pricing::KindRow;
    use crosstown_settlement::ChannelRegistry;

    use super::*;

    fn peer_info(ilp_address: &str, chains: &[&str]) -> PeerInfo {
        let mut settlement_addresses = HashMap::new();
        let mut preferred_tokens = HashMap::new();
        let mut token_networks = HashMap::new();
        for c in chains {
            settlement_addresses.insert(c.to_string(), format!("{c}-address"));
            preferred_tokens.insert(c.to_string(), format!("{c}-token"));
            token_networks.insert(c.to_string(), c.to_string());
        }
        PeerInfo {
            ilp_address: ilp_address.to_string(),
            btp_endpoint: "http://127.0.0.1:9000".to_string(),
            asset_code: "XRP".to_string(),
            asset_scale: 6,
            supported_chains: chains.iter().map(|s| s.to_string()).collect(),
            settlement_addresses,
            preferred_tokens,
            token_networks,
        }
    }

    #[tokio::test]
    async fn a_fresh_bootstrap_starts_discovering() {
        let registry = ChannelRegistry::new();
        let store = Arc::new(EventStore::connect("sqlite::memory:").await.unwrap());
        let pricing = Arc::new(PricingPolicy::new(HashMap::new(), KindRow::default()));
        let bls = Arc::new(Bls::new(store.clone(), pricing.clone()));
        let connector = Arc::new(EmbeddedConnector::new("g.crosstown.alice", bls, registry));
        let keypair = Arc::new(KeyPair::generate());

        let bootstrap = Bootstrap::new(
            BootstrapConfig::default(),
            keypair,
            store,
            pricing,
            connector.clone() as Arc<dyn ConnectorRuntime>,
            connector.clone() as Arc<dyn ConnectorAdmin>,
            connector as Arc<dyn ConnectorChannel>,
        );
        assert_eq!(bootstrap.phase(), BootstrapPhase::Discovering);
    }

    #[tokio::test]
    async fn run_fails_with_no_known_or_discovered_peers() {
        let registry = ChannelRegistry::new();
        let store = Arc::new(EventStore::connect("sqlite::memory:").await.unwrap());
        let pricing = Arc::new(PricingPolicy::new(HashMap::new(), KindRow::default()));
        let bls = Arc::new(Bls::new(store.clone(), pricing.clone()));
        let connector = Arc::new(EmbeddedConnector::new("g.crosstown.alice", bls, registry));
        let keypair = Arc::new(KeyPair::generate());

        let config = BootstrapConfig { discovery_window: Duration::from_millis(50), ..Default::default() };
        let bootstrap = Bootstrap::new(
            config,
            keypair,
            store,
            pricing,
            connector.clone() as Arc<dyn ConnectorRuntime>,
            connector.clone() as Arc<dyn ConnectorAdmin>,
            connector as Arc<dyn ConnectorChannel>,
        );

        let err = bootstrap.run().await.unwrap_err();
        assert!(matches!(err, BootstrapError::NoPeersAvailable));
        assert_eq!(bootstrap.phase(), BootstrapPhase::Failed);
    }

    /// Publishes bob's own kind-10032 peer-info event into `bob_store` and
    /// serves it from a real relay, so discovery has something genuine to
    /// dial rather than a value handed in directly.
    async fn spawn_bob_relay(bob_store: Arc<EventStore>, bob_kp: &KeyPair, info: &PeerInfo) -> String {
        let content = serde_json::to_string(info).unwrap();
        let pubkey = bob_kp.public_key().0;
        let created_at = chrono::Utc::now().timestamp();
        let id = crosstown_crypto::hash::event_id(&pubkey, created_at, crosstown_types::kinds::PEER_INFO, &[], &content);
        let sig = crosstown_crypto::sign_event(bob_kp, &id).unwrap();
        let event = crosstown_types::SignedEvent { id, pubkey, created_at, kind: crosstown_types::kinds::PEER_INFO, tags: vec![], content, sig };
        bob_store.put(event).await.unwrap();

        let relay = crosstown_relay::Relay::new(bob_store);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, relay.router()).await.unwrap();
        });
        format!("ws://{addr}/relay")
    }

    #[tokio::test]
    async fn full_flow_reaches_ready_against_a_discovered_peer() {
        let alice_store = Arc::new(EventStore::connect("sqlite::memory:").await.unwrap());
        let bob_store = Arc::new(EventStore::connect("sqlite::memory:").await.unwrap());
        let pricing = Arc::new(PricingPolicy::new(HashMap::new(), KindRow::default()).with_default_free_handshake_kinds());

        let alice_kp = Arc::new(KeyPair::generate());
        let bob_kp = KeyPair::generate();
        let bob_pubkey = bob_kp.public_key().0;

        let alice_bls = Arc::new(Bls::new(alice_store.clone(), pricing.clone()));
        let bob_bls = Arc::new(Bls::new(bob_store.clone(), pricing.clone()));

        let alice = Arc::new(EmbeddedConnector::new("g.crosstown.alice", alice_bls, ChannelRegistry::new()));
        let bob = Arc::new(EmbeddedConnector::new("g.crosstown.bob", bob_bls, ChannelRegistry::new()));
        // Stands in for the BTP transport a real deployment would use
        // between alice and bob: packets addressed to bob route straight to
        // bob's own embedded BLS.
        alice.register_peer_runtime("g.crosstown.bob", bob.clone());

        let bob_info = peer_info("g.crosstown.bob", &["ethereum"]);
        let relay_url = spawn_bob_relay(bob_store.clone(), &bob_kp, &bob_info).await;

        // Stands in for bob's own bootstrap responder answering alice's
        // handshake request: stores bob's reply straight into alice's
        // store, the way a reply packet routed back over BTP would.
        let alice_store_for_responder = alice_store.clone();
        let bob_store_for_responder = bob_store.clone();
        let bob_kp_for_responder = bob_kp;
        let responder = tokio::spawn(async move {
            let mut rx = bob_store_for_responder.subscribe();
            let stored = loop {
                let stored = rx.recv().await.unwrap();
                if stored.event.kind == crosstown_types::kinds::HANDSHAKE_REQUEST {
                    break stored;
                }
            };
            let request: wire::HandshakeRequest = serde_json::from_str(&stored.event.content).unwrap();
            let response = wire::HandshakeResponse {
                request_id: request.request_id.clone(),
                supported_chains: vec!["ethereum".to_string()],
                settlement_addresses: [("ethereum".to_string(), "0xbob".to_string())].into_iter().collect(),
                preferred_tokens: [("ethereum".to_string(), "0xtoken".to_string())].into_iter().collect(),
            };
            let content = serde_json::to_string(&response).unwrap();
            let pubkey = bob_pubkey.clone();
            let created_at = chrono::Utc::now().timestamp();
            let tags = vec![vec!["e".to_string(), request.request_id]];
            let id = crosstown_crypto::hash::event_id(&pubkey, created_at, crosstown_types::kinds::HANDSHAKE_RESPONSE, &tags, &content);
            let sig = crosstown_crypto::sign_event(&bob_kp_for_responder, &id).unwrap();
            let event = crosstown_types::SignedEvent { id, pubkey, created_at, kind: crosstown_types::kinds::HANDSHAKE_RESPONSE, tags, content, sig };
            alice_store_for_responder.put(event).await.unwrap();
        });

        let known_peer = KnownPeer { pubkey: bob_pubkey.clone(), relay_url, btp_endpoint: "http://127.0.0.1:9000".to_string() };
        let config = BootstrapConfig {
            known_peers: vec![known_peer],
            discovery_window: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(2),
            supported_chains: vec!["ethereum".to_string()],
            local_ilp_address: "g.crosstown.alice".to_string(),
            local_btp_endpoint: "http://127.0.0.1:9100".to_string(),
            default_deposit: 1_000,
            ..Default::default()
        };

        let bootstrap = Bootstrap::new(
            config,
            alice_kp,
            alice_store,
            pricing,
            alice.clone() as Arc<dyn ConnectorRuntime>,
            alice.clone() as Arc<dyn ConnectorAdmin>,
            alice as Arc<dyn ConnectorChannel>,
        );

        bootstrap.run().await.unwrap();
        assert_eq!(bootstrap.phase(), BootstrapPhase::Ready);
        responder.await.unwrap();
    }
}
