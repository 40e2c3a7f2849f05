use thiserror::Error;

/// The one error taxonomy both adapters (embedded, remote) must expose:
/// consumers branch on these variants, never on which adapter
/// produced them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),
    #[error("insufficient deposit: required {required}, available {available}")]
    InsufficientDeposit { required: u64, available: u64 },
    #[error("timeout")]
    Timeout,
    #[error("internal error: {0}")]
    Internal(String),
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;
