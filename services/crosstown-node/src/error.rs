//! Top-level error type for the node binary: folds every workspace crate's
//! own error enum into one, the way `openibank-sdk::SdkError` wraps
//! `OpeniBankError` plus its own transport-level variants.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] crosstown_config::ConfigError),
    #[error(transparent)]
    Crypto(#[from] crosstown_crypto::CryptoError),
    #[error(transparent)]
    Store(#[from] crosstown_store::StoreError),
    #[error("bootstrap error: {0}")]
    Bootstrap(#[from] crosstown_bootstrap::BootstrapError),
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server task panicked: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

pub type NodeResult<T> = Result<T, NodeError>;
