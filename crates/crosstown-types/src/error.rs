use thiserror::Error;

/// Taxonomy shared across crates; each crate also keeps its own
/// narrower error enum and converts into/from this one at its boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaxonomyError {
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error("insufficient amount: required {required}, received {received}")]
    InsufficientAmount { required: u64, received: u64 },
    #[error("stale claim")]
    StaleClaim,
    #[error("store error: {0}")]
    StoreError(String),
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),
    #[error("timeout")]
    Timeout,
    #[error("config error: {0}")]
    ConfigError(String),
    #[error("internal error: {0}")]
    Internal(String),
}
