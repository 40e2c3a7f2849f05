use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("channel {0} not found")]
    ChannelNotFound(String),
    #[error("channel {0} is not open")]
    ChannelNotOpen(String),
    #[error("claim amount {amount} is not strictly greater than the last signed amount {last}")]
    AmountNotIncreasing { amount: u64, last: u64 },
    #[error("claim signature does not verify")]
    InvalidSignature,
    #[error("claim nonce {nonce} is not strictly greater than the last seen nonce {last}")]
    StaleNonce { nonce: u64, last: u64 },
    #[error("signing failed: {0}")]
    SigningFailed(String),
}

pub type SettlementResult<T> = Result<T, SettlementError>;
