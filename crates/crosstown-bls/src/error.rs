use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crosstown_types::{PacketResponse, RejectCode};

/// Every way `handle_packet` can fail to accept a packet. This is the single
/// place the packet-handling taxonomy converges: its `Into<PacketResponse>`
/// impl (embedded path) and its `IntoResponse` impl (HTTP path) both
/// match over the same variants, which is what keeps the two paths
/// bit-identical rather than merely "supposed to agree".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlsError {
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("invalid event encoding: {0}")]
    InvalidEventEncoding(String),
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error("insufficient amount: required {required}, received {received}")]
    InsufficientAmount { required: u64, received: u64 },
    #[error("stale claim")]
    StaleClaim,
    #[error("internal error: {0}")]
    Internal(String),
}

impl BlsError {
    pub fn code(&self) -> RejectCode {
        match self {
            BlsError::InsufficientAmount { .. } => RejectCode::F06,
            BlsError::Internal(_) => RejectCode::T00,
            _ => RejectCode::F00,
        }
    }
}

/// The embedded adapter never sees an HTTP status: a reject is just another
/// `PacketResponse` variant, produced from the same `(code, message,
/// required, received)` derivation `IntoResponse` below uses.
impl From<BlsError> for PacketResponse {
    fn from(err: BlsError) -> Self {
        let (required, received) = match &err {
            BlsError::InsufficientAmount { required, received } => (Some(*required), Some(*received)),
            _ => (None, None),
        };
        PacketResponse::Reject { code: err.code(), message: err.to_string(), required, received }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    accept: bool,
    code: RejectCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    required: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    received: Option<u64>,
}

impl IntoResponse for BlsError {
    fn into_response(self) -> Response {
        let (required, received) = match &self {
            BlsError::InsufficientAmount { required, received } => (Some(*required), Some(*received)),
            _ => (None, None),
        };
        let body = ErrorBody { accept: false, code: self.code(), message: self.to_string(), required, received };
        // The relay/packet path never signals transport-level failure via
        // HTTP status: the reject is a 200 with a structured body, same as
        // the embedded adapter's in-process `PacketResponse::Reject`.
        (StatusCode::OK, Json(body)).into_response()
    }
}
