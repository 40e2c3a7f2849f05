//! Business Logic Server: the packet-acceptance boundary between an inbound
//! ILP-style payment packet and the event store. Verifies the embedded
//! event's id and signature, prices it, checks any payment-channel-claim
//! sidecar, and persists it exactly once.
//!
//! Exposed two ways: in-process via [`Bls::handle_packet`] (the
//! embedded connector adapter), and over HTTP via [`http::router`] (the
//! remote connector adapter). Both paths share this one implementation, so
//! their responses are bit-identical by construction rather than by
//! convention.

pub mod claims;
pub mod error;
pub mod handler;
pub mod http;

pub use error::BlsError;
pub use handler::Bls;
