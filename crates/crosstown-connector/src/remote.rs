//! The remote adapter: drives a connector over its admin HTTP
//! surface instead of an in-process object. Every call follows
//! `openibank-sdk`'s `Client` idiom — build once, check `status().is_success()`
//! before decoding, fold a non-2xx response into this crate's one error
//! taxonomy rather than `reqwest`'s.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crosstown_types::{ChannelState, PacketRequest, PacketResponse};

use crate::error::{ConnectorError, ConnectorResult};
use crate::traits::{ConnectorAdmin, ConnectorChannel, ConnectorRuntime};
use crate::types::{OpenChannelParams, OpenChannelResult, PeerRegistration};

pub struct RemoteConnector {
    base_url: String,
    client: Client,
}

impl RemoteConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(10))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client with a timeout always builds");
        Self { base_url: base_url.into(), client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn classify_error(resp: reqwest::Response) -> ConnectorError {
        let status = resp.status();
        let message = resp.text().await.unwrap_or_default();
        match status.as_u16() {
            400..=499 => ConnectorError::InvalidArgument(message),
            _ => ConnectorError::Internal(message),
        }
    }

    fn map_transport_error(err: reqwest::Error) -> ConnectorError {
        if err.is_timeout() {
            ConnectorError::Timeout
        } else if err.is_connect() {
            ConnectorError::PeerUnreachable(err.to_string())
        } else {
            ConnectorError::Internal(err.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
struct AddPeerBody<'a> {
    #[serde(rename = "peerId")]
    peer_id: &'a str,
    url: &'a str,
    #[serde(rename = "authToken")]
    auth_token: &'a str,
    routes: &'a [crate::types::Route],
}

#[async_trait]
impl ConnectorRuntime for RemoteConnector {
    async fn send_ilp_packet(&self, req: PacketRequest) -> ConnectorResult<PacketResponse> {
        let resp = self
            .client
            .post(self.url("/admin/ilp/send"))
            .json(&req)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !resp.status().is_success() {
            return Err(Self::classify_error(resp).await);
        }
        resp.json::<PacketResponse>()
            .await
            .map_err(|e| ConnectorError::Internal(e.to_string()))
    }
}

#[async_trait]
impl ConnectorAdmin for RemoteConnector {
    async fn add_peer(&self, peer: PeerRegistration) -> ConnectorResult<()> {
        let body = AddPeerBody {
            peer_id: &peer.peer_id,
            url: &peer.btp_endpoint,
            auth_token: &peer.auth_token,
            routes: &peer.routes,
        };
        let resp = self
            .client
            .post(self.url("/admin/peers"))
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !resp.status().is_success() {
            return Err(Self::classify_error(resp).await);
        }
        Ok(())
    }

    async fn remove_peer(&self, peer_id: &str) -> ConnectorResult<()> {
        let resp = self
            .client
            .delete(self.url(&format!("/admin/peers/{peer_id}")))
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !resp.status().is_success() {
            return Err(Self::classify_error(resp).await);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ChannelStateBody {
    state: ChannelState,
}

#[async_trait]
impl ConnectorChannel for RemoteConnector {
    async fn open_channel(&self, params: OpenChannelParams) -> ConnectorResult<OpenChannelResult> {
        let resp = self
            .client
            .post(self.url("/admin/channels"))
            .json(&params)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !resp.status().is_success() {
            return Err(Self::classify_error(resp).await);
        }
        resp.json::<OpenChannelResult>()
            .await
            .map_err(|e| ConnectorError::Internal(e.to_string()))
    }

    async fn get_channel_state(&self, channel_id: &str) -> ConnectorResult<ChannelState> {
        let resp = self
            .client
            .get(self.url(&format!("/admin/channels/{channel_id}")))
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !resp.status().is_success() {
            return Err(Self::classify_error(resp).await);
        }
        let body: ChannelStateBody = resp.json().await.map_err(|e| ConnectorError::Internal(e.to_string()))?;
        Ok(body.state)
    }
}
