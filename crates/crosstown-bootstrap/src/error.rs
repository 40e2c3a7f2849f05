use thiserror::Error;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("no peer was discovered and none is known")]
    NoPeersAvailable,
    #[error("cancelled")]
    Cancelled,
}

pub type BootstrapResult<T> = Result<T, BootstrapError>;
