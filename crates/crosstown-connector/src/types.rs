use serde::{Deserialize, Serialize};

/// `ConnectorAdmin.addPeer` config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRegistration {
    pub peer_id: String,
    pub btp_endpoint: String,
    pub routes: Vec<Route>,
    #[serde(default)]
    pub auth_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub prefix: String,
    pub priority: u32,
}

/// `ConnectorChannel.openChannel` params. `deposit` here
/// is `initialDeposit` on the wire, matching the remote adapter's
/// `POST /admin/channels` body; `token` carries the asset/token address a
/// bare `initialDeposit` amount doesn't express on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChannelParams {
    pub peer_id: String,
    pub chain: String,
    pub token: String,
    pub peer_address: String,
    #[serde(rename = "initialDeposit")]
    pub deposit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChannelResult {
    pub channel_id: String,
}
