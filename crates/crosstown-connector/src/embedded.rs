//! The in-process adapter: used when a node's bootstrap/BLS and
//! connector live in the same binary. `sendIlpPacket` either calls
//! [`crosstown_bls::Bls::handle_packet`] directly, for self-addressed
//! packets, or hands off to a sibling node's [`ConnectorRuntime`] registered
//! via [`EmbeddedConnector::register_peer_runtime`] — the latter exists so
//! tests can wire two embedded nodes together without a real BTP transport,
//! which is out of scope.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use crosstown_bls::Bls;
use crosstown_settlement::ChannelRegistry;
use crosstown_types::{Channel, ChannelState, PacketRequest, PacketResponse};

use crate::error::{ConnectorError, ConnectorResult};
use crate::traits::{ConnectorAdmin, ConnectorChannel, ConnectorRuntime};
use crate::types::{OpenChannelParams, OpenChannelResult, PeerRegistration};

pub struct EmbeddedConnector {
    local_ilp_address: String,
    bls: Arc<Bls>,
    channels: Arc<ChannelRegistry>,
    peers: DashMap<String, PeerRegistration>,
    peer_runtimes: DashMap<String, Arc<dyn ConnectorRuntime>>,
}

impl EmbeddedConnector {
    pub fn new(local_ilp_address: impl Into<String>, bls: Arc<Bls>, channels: Arc<ChannelRegistry>) -> Self {
        Self {
            local_ilp_address: local_ilp_address.into(),
            bls,
            channels,
            peers: DashMap::new(),
            peer_runtimes: DashMap::new(),
        }
    }

    /// Wires a peer's runtime directly into this node, keyed by the ILP
    /// address packets destined for that peer will carry. Test-only plumbing:
    /// a real deployment routes to peers over BTP, which this adapter doesn't
    /// implement.
    pub fn register_peer_runtime(&self, destination: impl Into<String>, runtime: Arc<dyn ConnectorRuntime>) {
        self.peer_runtimes.insert(destination.into(), runtime);
    }

    pub fn registered_peer(&self, peer_id: &str) -> Option<PeerRegistration> {
        self.peers.get(peer_id).map(|p| p.clone())
    }
}

#[async_trait]
impl ConnectorRuntime for EmbeddedConnector {
    async fn send_ilp_packet(&self, req: PacketRequest) -> ConnectorResult<PacketResponse> {
        if req.destination == self.local_ilp_address {
            return match self.bls.handle_packet(&req).await {
                Ok(response) => Ok(response),
                Err(err) => Ok(PacketResponse::from(err)),
            };
        }
        if let Some(runtime) = self.peer_runtimes.get(&req.destination) {
            return runtime.send_ilp_packet(req).await;
        }
        Err(ConnectorError::PeerUnreachable(req.destination))
    }
}

#[async_trait]
impl ConnectorAdmin for EmbeddedConnector {
    async fn add_peer(&self, peer: PeerRegistration) -> ConnectorResult<()> {
        if peer.peer_id.is_empty() || peer.btp_endpoint.is_empty() {
            return Err(ConnectorError::InvalidArgument("peer_id and btp_endpoint are required".to_string()));
        }
        debug!(peer_id = %peer.peer_id, "registering peer");
        self.peers.insert(peer.peer_id.clone(), peer);
        Ok(())
    }

    async fn remove_peer(&self, peer_id: &str) -> ConnectorResult<()> {
        match self.peers.remove(peer_id) {
            Some(_) => {
                self.peer_runtimes.remove(peer_id);
                Ok(())
            }
            None => Err(ConnectorError::InvalidArgument(format!("unknown peer {peer_id}"))),
        }
    }
}

#[async_trait]
impl ConnectorChannel for EmbeddedConnector {
    /// No on-chain step to await in this adapter: the channel is recorded as
    /// `Open` immediately, with an id derived from the peer, chain, and
    /// deposit so repeated calls with identical params collide rather than
    /// quietly minting duplicate channels.
    async fn open_channel(&self, params: OpenChannelParams) -> ConnectorResult<OpenChannelResult> {
        if params.deposit == 0 {
            return Err(ConnectorError::InsufficientDeposit { required: 1, available: 0 });
        }
        let seed = format!("{}:{}:{}:{}", params.peer_id, params.chain, params.peer_address, params.deposit);
        let channel_id = crosstown_crypto::sha256_hex(seed.as_bytes());

        let channel = Channel {
            channel_id: channel_id.clone(),
            chain: params.chain,
            peer_address: params.peer_address,
            local_address: self.local_ilp_address.clone(),
            token_address: params.token,
            deposit: params.deposit,
            state: ChannelState::Open,
        };
        self.channels.insert(channel).await;
        Ok(OpenChannelResult { channel_id })
    }

    async fn get_channel_state(&self, channel_id: &str) -> ConnectorResult<ChannelState> {
        self.channels
            .get(channel_id)
            .await
            .map(|c| c.state)
            .ok_or_else(|| {
                warn!(channel_id, "channel state requested for unknown channel");
                ConnectorError::InvalidArgument(format!("unknown channel {channel_id}"))
            })
    }
}
