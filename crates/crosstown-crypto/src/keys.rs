use secp256k1::{rand, Keypair as Secp256k1Keypair, Secp256k1, SecretKey, XOnlyPublicKey};
use serde::{Deserialize, Serialize};

use crate::{CryptoError, CryptoResult};

/// 32-byte x-only public key, hex-encoded — the pubkey shape used on the
/// wire by `SignedEvent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(pub String);

impl PublicKey {
    pub fn from_xonly(xonly: &XOnlyPublicKey) -> Self {
        PublicKey(hex::encode(xonly.serialize()))
    }

    pub fn to_xonly(&self) -> CryptoResult<XOnlyPublicKey> {
        let bytes = hex::decode(&self.0)?;
        XOnlyPublicKey::from_slice(&bytes)
            .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))
    }
}

/// A node's signing identity: a secp256k1 keypair used for both event
/// signatures and channel-claim signatures.
pub struct KeyPair {
    keypair: Secp256k1Keypair,
}

impl KeyPair {
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let keypair = Secp256k1Keypair::new(&secp, &mut rand::thread_rng());
        Self { keypair }
    }

    /// Builds a keypair from a 32-byte hex-encoded secret key, as read from
    /// configuration (`privateKey`).
    pub fn from_hex(secret_hex: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(secret_hex)?;
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&bytes)
            .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?;
        Ok(Self { keypair: Secp256k1Keypair::from_secret_key(&secp, &secret) })
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.keypair.secret_bytes())
    }

    pub fn public_key(&self) -> PublicKey {
        let (xonly, _parity) = self.keypair.x_only_public_key();
        PublicKey::from_xonly(&xonly)
    }

    pub(crate) fn inner(&self) -> &Secp256k1Keypair {
        &self.keypair
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_then_roundtrip_through_hex() {
        let kp = KeyPair::generate();
        let restored = KeyPair::from_hex(&kp.secret_hex()).unwrap();
        assert_eq!(kp.public_key(), restored.public_key());
    }

    #[test]
    fn public_key_is_32_bytes() {
        let kp = KeyPair::generate();
        let pk = kp.public_key();
        assert_eq!(hex::decode(&pk.0).unwrap().len(), 32);
    }
}
