//! Handshake phase: exchange settlement-chain preferences with
//! a registered peer over the payment data plane itself, then open a
//! channel on the negotiated chain.
//!
//! The request/response round trip reuses `openibank-bridge::BridgeExecutor`'s
//! `initiate`/`execute` shape, generalized from an on-chain bridge step to
//! this settlement-chain negotiation: `initiate` here is sending the
//! zero-amount handshake packet, `execute` is opening the channel once a
//! response arrives.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::timeout;

use crosstown_codec::{encode_envelope, Envelope};
use crosstown_connector::{ConnectorChannel, ConnectorError, ConnectorRuntime};
use crosstown_crypto::{hash::event_id, sign_event, KeyPair};
use crosstown_types::{kinds, DiscoveredPeer, PacketRequest, StoredEvent};

use crate::wire::{HandshakeRequest, HandshakeResponse};

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("peer rejected handshake packet: {0}")]
    PacketRejected(String),
    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),
    #[error("no response from peer within the handshake timeout")]
    Timeout,
    #[error("response did not share a settlement chain with our preference list")]
    NoCommonChain,
    #[error("malformed handshake response: {0}")]
    Malformed(String),
}

pub struct HandshakeOutcome {
    pub channel_id: String,
    pub chain: String,
}

/// Sends a handshake request to `peer` and waits on `notify` (the local
/// store's own post-commit broadcast) for the matching response, since an
/// inbound reply addressed to us lands in our own store via our own BLS.
#[allow(clippy::too_many_arguments)]
pub async fn handshake_with_peer(
    peer: &DiscoveredPeer,
    supported_chains: &[String],
    settlement_addresses: &std::collections::HashMap<String, String>,
    preferred_tokens: &std::collections::HashMap<String, String>,
    default_deposit: u64,
    keypair: &KeyPair,
    runtime: &Arc<dyn ConnectorRuntime>,
    channel: &Arc<dyn ConnectorChannel>,
    notify: broadcast::Receiver<StoredEvent>,
    handshake_timeout: Duration,
) -> Result<HandshakeOutcome, HandshakeError> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let request = HandshakeRequest {
        request_id: request_id.clone(),
        supported_chains: supported_chains.to_vec(),
        settlement_addresses: settlement_addresses.clone(),
        preferred_tokens: preferred_tokens.clone(),
    };
    let content = serde_json::to_string(&request).expect("handshake request always serializes");

    let pubkey = keypair.public_key().0;
    let created_at = chrono::Utc::now().timestamp();
    let tags = vec![vec!["e".to_string(), request_id.clone()]];
    let id = event_id(&pubkey, created_at, kinds::HANDSHAKE_REQUEST, &tags, &content);
    let sig = sign_event(keypair, &id).map_err(|e| HandshakeError::Malformed(e.to_string()))?;
    let event = crosstown_types::SignedEvent { id, pubkey, created_at, kind: kinds::HANDSHAKE_REQUEST, tags, content, sig };

    let data = BASE64.encode(encode_envelope(&Envelope::Event(event)).expect("event always encodes"));
    let req = PacketRequest { amount: 0, destination: peer.peer_info.ilp_address.clone(), data, source_account: None };

    match runtime.send_ilp_packet(req).await? {
        crosstown_types::PacketResponse::Accept { .. } => {}
        crosstown_types::PacketResponse::Reject { message, .. } => return Err(HandshakeError::PacketRejected(message)),
    }

    let response = await_response(notify, &peer.pubkey, &request_id, handshake_timeout).await?;
    let negotiated = response.negotiate_chain(supported_chains).ok_or(HandshakeError::NoCommonChain)?;

    let result = channel
        .open_channel(crosstown_connector::OpenChannelParams {
            peer_id: peer.pubkey.clone(),
            chain: negotiated.chain.clone(),
            token: negotiated.token,
            peer_address: negotiated.peer_address,
            deposit: default_deposit,
        })
        .await?;

    Ok(HandshakeOutcome { channel_id: result.channel_id, chain: negotiated.chain })
}

async fn await_response(
    mut notify: broadcast::Receiver<StoredEvent>,
    peer_pubkey: &str,
    request_id: &str,
    handshake_timeout: Duration,
) -> Result<HandshakeResponse, HandshakeError> {
    let deadline = tokio::time::Instant::now() + handshake_timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(HandshakeError::Timeout);
        }
        let stored = match timeout(remaining, notify.recv()).await {
            Ok(Ok(stored)) => stored,
            Ok(Err(_)) => return Err(HandshakeError::Timeout),
            Err(_) => return Err(HandshakeError::Timeout),
        };
        if stored.event.kind != kinds::HANDSHAKE_RESPONSE || stored.event.pubkey != peer_pubkey {
            continue;
        }
        if !stored.event.tags.iter().any(|t| t.first().map(|n| n == "e").unwrap_or(false) && t.get(1).map(|v| v == request_id).unwrap_or(false))
        {
            continue;
        }
        let response: HandshakeResponse =
            serde_json::from_str(&stored.event.content).map_err(|e| HandshakeError::Malformed(e.to_string()))?;
        if response.request_id != request_id {
            continue;
        }
        return Ok(response);
    }
}
