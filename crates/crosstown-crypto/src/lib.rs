//! Event-id hashing and secp256k1 Schnorr signing/verification.
//!
//! Mirrors the shape of a typical signing crate (one error enum, one result
//! alias, `keys`/`signature`/`hash` submodules with free sign/verify
//! functions) but the underlying scheme is secp256k1 Schnorr (Nostr/Taproot
//! convention) rather than Ed25519: events carry a 32-byte x-only pubkey and
//! a 64-byte Schnorr signature.

pub mod hash;
pub mod keys;
pub mod signature;

pub use hash::{event_id, fulfillment, sha256, sha256_hex};
pub use keys::{KeyPair, PublicKey};
pub use signature::{sign_event, verify_event};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),
    #[error("signing failed: {0}")]
    SigningFailed(String),
    #[error("verification failed: {0}")]
    VerificationFailed(String),
    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
