//! The acceptance test for an incoming ILP-style packet.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use tracing::{debug, warn};

use crosstown_codec::Envelope;
use crosstown_pricing::PricingPolicy;
use crosstown_store::EventStore;
use crosstown_types::{PacketMetadata, PacketRequest, PacketResponse};

use crate::claims::ClaimTable;
use crate::BlsError;

/// Everything the packet handler needs: a store writer handle, the pricing
/// policy, and the claim table. Constructed once at startup and shared
/// (via `Arc`) between the embedded adapter call site and the HTTP surface,
/// which is what keeps the two paths bit-identical.
pub struct Bls {
    store: Arc<EventStore>,
    pricing: Arc<PricingPolicy>,
    claims: ClaimTable,
}

impl Bls {
    pub fn new(store: Arc<EventStore>, pricing: Arc<PricingPolicy>) -> Self {
        Self { store, pricing, claims: ClaimTable::new() }
    }

    /// `handlePacket`: base64-decode → envelope-decode → verify → price →
    /// (claim sidecar check) → persist → fulfillment. Never panics; every
    /// failure mode maps to a `BlsError` variant.
    pub async fn handle_packet(&self, req: &PacketRequest) -> Result<PacketResponse, BlsError> {
        let raw = BASE64
            .decode(&req.data)
            .map_err(|e| BlsError::InvalidData(e.to_string()))?;

        let envelope = crosstown_codec::decode_envelope(&raw)
            .map_err(|e| BlsError::InvalidEventEncoding(e.to_string()))?;
        let event = envelope.event();

        let expected_id = crosstown_crypto::hash::recompute_id(event);
        if expected_id != event.id {
            return Err(BlsError::InvalidSignature("id does not match the canonical hash".to_string()));
        }
        let verified = crosstown_crypto::verify_event(&event.id, &event.pubkey, &event.sig)
            .map_err(|e| BlsError::InvalidSignature(e.to_string()))?;
        if !verified {
            return Err(BlsError::InvalidSignature("signature does not verify".to_string()));
        }

        let price = self
            .pricing
            .price(event)
            .map_err(|e| BlsError::InvalidEventEncoding(e.to_string()))?;
        if price > req.amount {
            return Err(BlsError::InsufficientAmount { required: price, received: req.amount });
        }

        if let Envelope::EventWithClaim(_, claim) = &envelope {
            if !self.verify_and_record_claim(&event.pubkey, claim) {
                debug!(channel_id = %claim.channel_id, nonce = claim.nonce, "stale claim, event not persisted");
                return Err(BlsError::StaleClaim);
            }
        }

        let outcome = self.store.put(event.clone()).await.map_err(|e| {
            let message = e.to_string();
            match e {
                crosstown_store::StoreError::InvalidEvent(msg) => BlsError::InvalidEvent(msg),
                crosstown_store::StoreError::Database(_)
                | crosstown_store::StoreError::Migration(_)
                | crosstown_store::StoreError::Serialization(_) => BlsError::Internal(message),
            }
        })?;

        let _ = outcome; // idempotent re-puts still accept, at-most-once persistence either way
        let fulfillment = hex::encode(crosstown_crypto::hash::fulfillment(&event.id));
        Ok(PacketResponse::Accept {
            fulfillment,
            metadata: PacketMetadata { event_id: Some(event.id.clone()), stored_at: Some(Utc::now().timestamp()) },
        })
    }

    /// Authenticates the claim sidecar against the event's own pubkey (the
    /// envelope carries exactly one signer, the node that sent the packet)
    /// and records it if strictly newer. Returns `false` for a stale or
    /// unverifiable claim.
    fn verify_and_record_claim(&self, signer: &str, claim: &crosstown_types::SignedClaim) -> bool {
        let digest = crosstown_crypto::hash::claim_digest(&claim.channel_id, claim.nonce, claim.amount);
        let verified = crosstown_crypto::verify_event(&digest, signer, &claim.signature).unwrap_or(false);
        if !verified {
            warn!(channel_id = %claim.channel_id, "claim signature does not verify");
            return false;
        }
        self.claims.record_if_newer(signer, claim)
    }

    pub fn latest_claim(&self, channel_id: &str, signer: &str) -> Option<crosstown_types::SignedClaim> {
        self.claims.latest_for(channel_id, signer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crosstown_crypto::{hash::event_id, sign_event, KeyPair};
    use crosstown_pricing::KindRow;
    use crosstown_types::{kinds, SignedEvent};

    async fn fresh_bls(rows: HashMap<u32, KindRow>) -> Bls {
        let store = Arc::new(EventStore::connect("sqlite::memory:").await.unwrap());
        let pricing = Arc::new(PricingPolicy::new(rows, KindRow::default()).with_default_free_handshake_kinds());
        Bls::new(store, pricing)
    }

    fn sign(kp: &KeyPair, kind: u32, content: &str) -> SignedEvent {
        sign_at(kp, kind, content, Utc::now().timestamp())
    }

    fn sign_at(kp: &KeyPair, kind: u32, content: &str, created_at: i64) -> SignedEvent {
        let pubkey = kp.public_key().0;
        let tags = vec![];
        let id = event_id(&pubkey, created_at, kind, &tags, content);
        let sig = sign_event(kp, &id).unwrap();
        SignedEvent { id, pubkey, created_at, kind, tags, content: content.to_string(), sig }
    }

    fn bare_request(event: &SignedEvent, amount: u64) -> PacketRequest {
        let bytes = crosstown_codec::encode_envelope(&Envelope::Event(event.clone())).unwrap();
        PacketRequest { amount, destination: "g.crosstown.test".to_string(), data: BASE64.encode(bytes), source_account: None }
    }

    #[tokio::test]
    async fn exact_price_is_accepted_and_fulfillment_is_deterministic() {
        let mut rows = HashMap::new();
        rows.insert(kinds::NOTE, KindRow { base: 100, per_byte: 10 });
        let bls = fresh_bls(rows).await;
        let kp = KeyPair::generate();
        let event = sign(&kp, kinds::NOTE, "hi");
        let price = bls.pricing.price(&event).unwrap();

        let response = bls.handle_packet(&bare_request(&event, price)).await.unwrap();
        let PacketResponse::Accept { fulfillment, .. } = response else { panic!("expected accept") };
        assert_eq!(fulfillment, hex::encode(crosstown_crypto::hash::fulfillment(&event.id)));
    }

    #[tokio::test]
    async fn one_unit_underpayment_is_rejected_with_f06() {
        let mut rows = HashMap::new();
        rows.insert(kinds::NOTE, KindRow { base: 100, per_byte: 10 });
        let bls = fresh_bls(rows).await;
        let kp = KeyPair::generate();
        let event = sign(&kp, kinds::NOTE, "hi");
        let price = bls.pricing.price(&event).unwrap();

        let err = bls.handle_packet(&bare_request(&event, price - 1)).await.unwrap_err();
        assert_eq!(err, BlsError::InsufficientAmount { required: price, received: price - 1 });
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected() {
        let bls = fresh_bls(HashMap::new()).await;
        let kp = KeyPair::generate();
        let mut event = sign(&kp, kinds::NOTE, "hi");
        event.sig = "00".repeat(64);

        let err = bls.handle_packet(&bare_request(&event, 1_000_000)).await.unwrap_err();
        assert!(matches!(err, BlsError::InvalidSignature(_)));
    }

    #[tokio::test]
    async fn zero_amount_is_accepted_only_for_free_handshake_kind() {
        let bls = fresh_bls(HashMap::new()).await;
        let kp = KeyPair::generate();
        let handshake = sign(&kp, kinds::HANDSHAKE_REQUEST, "req");
        assert!(bls.handle_packet(&bare_request(&handshake, 0)).await.unwrap().is_accept());

        let note = sign(&kp, kinds::NOTE, "not free");
        let err = bls.handle_packet(&bare_request(&note, 0)).await.unwrap_err();
        assert!(matches!(err, BlsError::InsufficientAmount { .. }));
    }

    #[tokio::test]
    async fn duplicate_event_is_idempotently_accepted() {
        let bls = fresh_bls(HashMap::new()).await;
        let kp = KeyPair::generate();
        let event = sign(&kp, kinds::NOTE, "hi");

        assert!(bls.handle_packet(&bare_request(&event, 1_000_000)).await.unwrap().is_accept());
        assert!(bls.handle_packet(&bare_request(&event, 1_000_000)).await.unwrap().is_accept());
    }

    #[tokio::test]
    async fn event_outside_acceptance_window_is_rejected_with_f00_not_t00() {
        let bls = fresh_bls(HashMap::new()).await;
        let kp = KeyPair::generate();
        let stale_at = Utc::now().timestamp() - crosstown_store::ACCEPTANCE_WINDOW_SECS - 60;
        let event = sign_at(&kp, kinds::NOTE, "too old", stale_at);

        let err = bls.handle_packet(&bare_request(&event, 1_000_000)).await.unwrap_err();
        assert!(matches!(err, BlsError::InvalidEvent(_)));
        assert_eq!(err.code(), crosstown_types::RejectCode::F00);
        assert!(bls.store.get(&event.id).await.is_none());
    }

    #[tokio::test]
    async fn stale_claim_is_rejected_and_event_not_persisted() {
        let bls = fresh_bls(HashMap::new()).await;
        let kp = KeyPair::generate();
        let event = sign(&kp, kinds::NOTE, "paid via channel");

        let digest = crosstown_crypto::hash::claim_digest(&"11".repeat(32), 5, 500);
        let sig = sign_event(&kp, &digest).unwrap();
        let claim = crosstown_types::SignedClaim { channel_id: "11".repeat(32), nonce: 5, amount: 500, signature: sig };
        bls.claims.record_if_newer(&kp.public_key().0, &claim);

        let stale_sig = sign_event(&kp, &crosstown_crypto::hash::claim_digest(&"11".repeat(32), 5, 600)).unwrap();
        let stale_claim = crosstown_types::SignedClaim { channel_id: "11".repeat(32), nonce: 5, amount: 600, signature: stale_sig };
        let bytes = crosstown_codec::encode_envelope(&Envelope::EventWithClaim(event.clone(), stale_claim)).unwrap();
        let req = PacketRequest { amount: 1_000_000, destination: "g.test".to_string(), data: BASE64.encode(bytes), source_account: None };

        let err = bls.handle_packet(&req).await.unwrap_err();
        assert_eq!(err, BlsError::StaleClaim);
        assert!(bls.store.get(&event.id).await.is_none());
        assert_eq!(bls.claims.latest_for(&"11".repeat(32), &kp.public_key().0).unwrap().amount, 500);
    }
}
