use serde::{Deserialize, Serialize};

/// Strictly forward except into `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPhase {
    Discovering,
    Registering,
    Handshaking,
    Announcing,
    Ready,
    Failed,
}

impl BootstrapPhase {
    /// True if `self -> next` is a legal forward transition (or into Failed).
    pub fn can_transition_to(self, next: BootstrapPhase) -> bool {
        use BootstrapPhase::*;
        if next == Failed {
            return self != Ready && self != Failed;
        }
        matches!(
            (self, next),
            (Discovering, Registering)
                | (Registering, Handshaking)
                | (Handshaking, Announcing)
                | (Announcing, Ready)
        )
    }
}

/// Advisory events emitted on every bootstrap transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BootstrapEvent {
    #[serde(rename = "bootstrap:discovering")]
    Discovering,
    #[serde(rename = "bootstrap:registering")]
    Registering { peer_id: String },
    #[serde(rename = "bootstrap:peer-registered")]
    PeerRegistered { peer_id: String },
    #[serde(rename = "bootstrap:handshaking")]
    Handshaking,
    #[serde(rename = "bootstrap:channel-opened")]
    ChannelOpened { peer_id: String, channel_id: String },
    #[serde(rename = "bootstrap:announcing")]
    Announcing,
    #[serde(rename = "bootstrap:announced")]
    Announced { peer_id: String },
    #[serde(rename = "bootstrap:ready")]
    Ready,
    #[serde(rename = "bootstrap:failed")]
    Failed { reason: String },
}
