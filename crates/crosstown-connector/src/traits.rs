use async_trait::async_trait;

use crosstown_types::{ChannelState, PacketRequest, PacketResponse};

use crate::error::ConnectorResult;
use crate::types::{OpenChannelParams, OpenChannelResult, PeerRegistration};

/// `sendIlpPacket`: embeds either a direct in-process call or a
/// `POST /admin/ilp/send`, depending on the adapter.
#[async_trait]
pub trait ConnectorRuntime: Send + Sync {
    async fn send_ilp_packet(&self, req: PacketRequest) -> ConnectorResult<PacketResponse>;
}

/// `addPeer`/`removePeer`.
#[async_trait]
pub trait ConnectorAdmin: Send + Sync {
    async fn add_peer(&self, peer: PeerRegistration) -> ConnectorResult<()>;
    async fn remove_peer(&self, peer_id: &str) -> ConnectorResult<()>;
}

/// `openChannel`/`getChannelState`.
#[async_trait]
pub trait ConnectorChannel: Send + Sync {
    async fn open_channel(&self, params: OpenChannelParams) -> ConnectorResult<OpenChannelResult>;
    async fn get_channel_state(&self, channel_id: &str) -> ConnectorResult<ChannelState>;
}
