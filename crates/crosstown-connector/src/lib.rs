//! Connector Interface Layer: the `Runtime`/`Admin`/`Channel`
//! abstraction a node drives either in-process ([`embedded::EmbeddedConnector`])
//! or over an admin HTTP surface ([`remote::RemoteConnector`]). Both adapters
//! implement the same three traits and the same [`error::ConnectorError`]
//! taxonomy, so the bootstrap state machine and service layer never branch
//! on which one they were handed.
//!
//! Grounded in `openibank-bridge::BridgeExecutor`'s single-trait,
//! multi-adapter shape, with the adapters themselves following
//! `openibank-sdk::OpeniBank`'s HTTP client idiom.

pub mod embedded;
pub mod error;
pub mod remote;
pub mod traits;
pub mod types;

pub use embedded::EmbeddedConnector;
pub use error::{ConnectorError, ConnectorResult};
pub use remote::RemoteConnector;
pub use traits::{ConnectorAdmin, ConnectorChannel, ConnectorRuntime};
pub use types::{OpenChannelParams, OpenChannelResult, PeerRegistration, Route};
