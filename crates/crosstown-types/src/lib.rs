//! Shared data model for the Crosstown relay/payment node.
//!
//! Every other crate in the workspace depends on this one and none of its
//! siblings; it carries no I/O.

pub mod bootstrap;
pub mod channel;
pub mod error;
pub mod event;
pub mod filter;
pub mod packet;
pub mod peer;
pub mod subscription;

pub use bootstrap::{BootstrapEvent, BootstrapPhase};
pub use channel::{Channel, ChannelState, SignedClaim};
pub use error::TaxonomyError;
pub use event::{kind_category, kinds, KindCategory, SignedEvent, StoredEvent, Tag};
pub use filter::Filter;
pub use packet::{PacketMetadata, PacketRequest, PacketResponse, RejectCode};
pub use peer::{DiscoveredPeer, KnownPeer, PeerInfo};
pub use subscription::Subscription;
