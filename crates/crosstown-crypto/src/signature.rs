use secp256k1::{schnorr, Message, Secp256k1, XOnlyPublicKey};

use crate::keys::KeyPair;
use crate::{CryptoError, CryptoResult};

/// Signs a 32-byte message digest (typically `event.id` decoded from hex)
/// with the node's keypair, returning a 64-byte hex-encoded Schnorr signature.
pub fn sign_event(keypair: &KeyPair, id_hex: &str) -> CryptoResult<String> {
    let digest = hex::decode(id_hex)?;
    let message = Message::from_digest_slice(&digest)
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
    let secp = Secp256k1::new();
    let sig = secp.sign_schnorr(&message, keypair.inner());
    Ok(hex::encode(sig.as_ref()))
}

/// Verifies a 64-byte hex Schnorr signature over a 32-byte hex id digest
/// against a 32-byte hex x-only public key.
pub fn verify_event(id_hex: &str, pubkey_hex: &str, sig_hex: &str) -> CryptoResult<bool> {
    let digest = hex::decode(id_hex)?;
    let message = Message::from_digest_slice(&digest)
        .map_err(|e| CryptoError::VerificationFailed(e.to_string()))?;
    let pubkey_bytes = hex::decode(pubkey_hex)?;
    let xonly = XOnlyPublicKey::from_slice(&pubkey_bytes)
        .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?;
    let sig_bytes = hex::decode(sig_hex)?;
    let sig = match schnorr::Signature::from_slice(&sig_bytes) {
        Ok(s) => s,
        Err(_) => return Ok(false),
    };
    let secp = Secp256k1::new();
    Ok(secp.verify_schnorr(&sig, &message, &xonly).is_ok())
}
