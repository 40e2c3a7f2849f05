//! In-memory "latest claim" table keyed by `(channelId, signer)`, consulted
//! by the packet handler when a decoded envelope carries a
//! payment-channel-claim sidecar.
//!
//! `dashmap` gives per-key locking without a single global mutex, matching
//! how `crosstown-store`'s index favors a reader/writer split over one lock
//! for the whole table.

use dashmap::DashMap;

use crosstown_types::SignedClaim;

#[derive(Debug, Default)]
pub struct ClaimTable {
    latest: DashMap<(String, String), SignedClaim>,
}

impl ClaimTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and records the claim if `claim.nonce` is strictly
    /// greater than the last nonce seen for `(channelId, signer)`; otherwise
    /// leaves the table untouched and returns `false`.
    pub fn record_if_newer(&self, signer: &str, claim: &SignedClaim) -> bool {
        let key = (claim.channel_id.clone(), signer.to_string());
        let mut newer = true;
        self.latest
            .entry(key)
            .and_modify(|existing| {
                if claim.nonce > existing.nonce {
                    *existing = claim.clone();
                } else {
                    newer = false;
                }
            })
            .or_insert_with(|| claim.clone());
        newer
    }

    pub fn latest_for(&self, channel_id: &str, signer: &str) -> Option<SignedClaim> {
        self.latest.get(&(channel_id.to_string(), signer.to_string())).map(|r| r.clone())
    }
}
