//! Relay WebSocket server: the `REQ`/`CLOSE`/`EVENT` subscription
//! protocol clients speak against the event store. Payment-gated
//! publication stays on the BLS path (`crosstown-bls`); this crate only
//! ever serves reads and the live tail of what the BLS has already
//! accepted.

pub mod connection;
pub mod frame;
pub mod server;

pub use connection::{ConnectionPhase, ConnectionState};
pub use frame::{ClientFrame, FrameError, ServerFrame};
pub use server::Relay;
