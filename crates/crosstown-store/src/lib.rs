//! Durable, queryable store of `StoredEvent`s with NIP-01-style
//! replaceable-event semantics and a pure filter matcher.
//!
//! The `events` table (backed by `sqlx`/SQLite) is the durability boundary;
//! an in-memory `RwLock`-guarded index mirrors it so `query` never needs a
//! full table scan, and is rebuilt from the table on startup. `put` holds
//! the index's write lock across its own transaction, which is what makes
//! it serializable with respect to itself and to concurrent `query` calls.

pub mod error;
pub mod filter;

use std::collections::HashMap;

use chrono::Utc;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

pub use error::{StoreError, StoreResult};
pub use filter::matches;

use crosstown_types::{kind_category, KindCategory, SignedEvent, StoredEvent};

/// `created_at` must fall within this many seconds of the local clock on
/// ingress.
pub const ACCEPTANCE_WINDOW_SECS: i64 = 600;

/// Bound on the post-commit notification channel; a subscriber that falls
/// this far behind starts missing live events (the relay server is expected
/// to treat its own per-connection backpressure, as the real limit —
/// this channel capacity is generous headroom above that).
const NOTIFY_CHANNEL_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOutcome {
    pub stored: bool,
    pub replaced_ids: Vec<String>,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum ReplaceKey {
    PubkeyKind(String, u32),
    PubkeyKindD(String, u32, String),
}

#[derive(Default)]
struct Index {
    by_id: HashMap<String, StoredEvent>,
    replaceable: HashMap<(String, u32), String>,
    addressable: HashMap<(String, u32, String), String>,
}

impl Index {
    fn existing_for(&self, key: &ReplaceKey) -> Option<String> {
        match key {
            ReplaceKey::PubkeyKind(pubkey, kind) => self.replaceable.get(&(pubkey.clone(), *kind)).cloned(),
            ReplaceKey::PubkeyKindD(pubkey, kind, d) => {
                self.addressable.get(&(pubkey.clone(), *kind, d.clone())).cloned()
            }
        }
    }

    fn record(&mut self, key: &ReplaceKey, id: String) {
        match key {
            ReplaceKey::PubkeyKind(pubkey, kind) => {
                self.replaceable.insert((pubkey.clone(), *kind), id);
            }
            ReplaceKey::PubkeyKindD(pubkey, kind, d) => {
                self.addressable.insert((pubkey.clone(), *kind, d.clone()), id);
            }
        }
    }
}

pub struct EventStore {
    pool: SqlitePool,
    index: RwLock<Index>,
    notify: broadcast::Sender<StoredEvent>,
}

impl EventStore {
    /// Connects to the SQLite database at `database_url`, runs migrations,
    /// and rebuilds the in-memory index from the table. Pass
    /// `"sqlite::memory:"` for an ephemeral, single-connection store (tests,
    /// `--store.path :memory:`).
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let is_memory = database_url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if is_memory { 1 } else { 8 })
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let store = Self { pool, index: RwLock::new(Index::default()), notify: broadcast::channel(NOTIFY_CHANNEL_CAPACITY).0 };
        store.rebuild_index().await?;
        Ok(store)
    }

    async fn rebuild_index(&self) -> StoreResult<()> {
        let rows = sqlx::query("SELECT id, pubkey, kind, content, tags_blob, created_at, sig, received_at FROM events")
            .fetch_all(&self.pool)
            .await?;

        let mut index = self.index.write().await;
        for row in &rows {
            let stored = row_to_stored_event(row)?;
            let category = kind_category(stored.event.kind);
            let id = stored.event.id.clone();
            match category {
                KindCategory::Replaceable => {
                    index.record(&ReplaceKey::PubkeyKind(stored.event.pubkey.clone(), stored.event.kind), id.clone());
                }
                KindCategory::Addressable => {
                    index.record(
                        &ReplaceKey::PubkeyKindD(stored.event.pubkey.clone(), stored.event.kind, stored.event.d_tag_value()),
                        id.clone(),
                    );
                }
                _ => {}
            }
            index.by_id.insert(id, stored);
        }
        info!(events = index.by_id.len(), "event store index rebuilt from disk");
        Ok(())
    }

    /// A fresh receiver of every successfully persisted event, in commit
    /// order. Owned by subscribers (the relay server's fan-out task); the
    /// store never calls back into anything downstream.
    pub fn subscribe(&self) -> broadcast::Receiver<StoredEvent> {
        self.notify.subscribe()
    }

    fn validate(&self, event: &SignedEvent) -> StoreResult<()> {
        let expected_id = crosstown_crypto::hash::recompute_id(event);
        if expected_id != event.id {
            return Err(StoreError::InvalidEvent("id does not match the canonical hash".to_string()));
        }
        let verified = crosstown_crypto::verify_event(&event.id, &event.pubkey, &event.sig)
            .map_err(|e| StoreError::InvalidEvent(format!("signature could not be checked: {e}")))?;
        if !verified {
            return Err(StoreError::InvalidEvent("signature does not verify".to_string()));
        }
        let drift = (event.created_at - Utc::now().timestamp()).abs();
        if drift > ACCEPTANCE_WINDOW_SECS {
            return Err(StoreError::InvalidEvent(format!(
                "created_at drifts {drift}s from local clock, outside the {ACCEPTANCE_WINDOW_SECS}s window"
            )));
        }
        Ok(())
    }

    /// `put`: rejects invalid events, is idempotent on duplicate id,
    /// acknowledges-without-storing ephemeral kinds, and atomically replaces
    /// the prior event for replaceable/addressable kinds when the incoming
    /// event is strictly newer.
    pub async fn put(&self, event: SignedEvent) -> StoreResult<PutOutcome> {
        self.validate(&event)?;

        let category = kind_category(event.kind);
        if category == KindCategory::Ephemeral {
            debug!(kind = event.kind, "ephemeral event acknowledged without persistence");
            // Never durable, but still delivered to whoever is listening
            // right now (NIP-01 ephemeral semantics) — the handshake
            // request/response round trip depends on this live delivery.
            let received_at = Utc::now().timestamp();
            let _ = self.notify.send(StoredEvent { event, received_at });
            return Ok(PutOutcome::default());
        }

        let mut index = self.index.write().await;

        if index.by_id.contains_key(&event.id) {
            return Ok(PutOutcome::default());
        }

        let replace_key = match category {
            KindCategory::Replaceable => Some(ReplaceKey::PubkeyKind(event.pubkey.clone(), event.kind)),
            KindCategory::Addressable => {
                Some(ReplaceKey::PubkeyKindD(event.pubkey.clone(), event.kind, event.d_tag_value()))
            }
            _ => None,
        };

        let existing_id = replace_key.as_ref().and_then(|key| index.existing_for(key));
        if let Some(existing_id) = &existing_id {
            if let Some(existing) = index.by_id.get(existing_id) {
                if existing.event.created_at >= event.created_at {
                    // Not strictly newer than the current winner: dropped,
                    // the stored event keeps its place.
                    return Ok(PutOutcome::default());
                }
            }
        }

        let received_at = Utc::now().timestamp();
        let tags_blob = serde_json::to_string(&event.tags)?;

        let mut tx = self.pool.begin().await?;
        if let Some(old_id) = &existing_id {
            sqlx::query("DELETE FROM events WHERE id = ?").bind(old_id).execute(&mut *tx).await?;
        }
        sqlx::query(
            "INSERT INTO events (id, pubkey, kind, content, tags_blob, created_at, sig, received_at, d_tag_value) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id)
        .bind(&event.pubkey)
        .bind(event.kind as i64)
        .bind(&event.content)
        .bind(&tags_blob)
        .bind(event.created_at)
        .bind(&event.sig)
        .bind(received_at)
        .bind(event.d_tag_value())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut replaced_ids = Vec::new();
        if let Some(old_id) = existing_id {
            index.by_id.remove(&old_id);
            replaced_ids.push(old_id);
        }
        let stored_event = StoredEvent { event: event.clone(), received_at };
        index.by_id.insert(event.id.clone(), stored_event.clone());
        if let Some(key) = &replace_key {
            index.record(key, event.id.clone());
        }
        drop(index);

        // A lagging/absent subscriber is not an error: nothing is listening yet.
        let _ = self.notify.send(stored_event);

        Ok(PutOutcome { stored: true, replaced_ids })
    }

    pub async fn get(&self, id: &str) -> Option<StoredEvent> {
        self.index.read().await.by_id.get(id).cloned()
    }

    /// `query`: each filter's `limit` is applied independently (after
    /// sorting that filter's own matches reverse-chronologically), results
    /// are then merged and de-duplicated by id, and the merged set is
    /// re-sorted `created_at` desc, `id` asc.
    pub async fn query(&self, filters: &[crosstown_types::Filter]) -> Vec<StoredEvent> {
        let index = self.index.read().await;
        let mut seen = std::collections::HashSet::new();
        let mut merged = Vec::new();

        for filter in filters {
            let mut per_filter: Vec<&StoredEvent> =
                index.by_id.values().filter(|stored| matches(filter, &stored.event)).collect();
            per_filter.sort_by(|a, b| b.event.created_at.cmp(&a.event.created_at).then(a.event.id.cmp(&b.event.id)));
            if let Some(limit) = filter.limit {
                per_filter.truncate(limit as usize);
            }
            for stored in per_filter {
                if seen.insert(stored.event.id.clone()) {
                    merged.push(stored.clone());
                }
            }
        }

        merged.sort_by(|a, b| b.event.created_at.cmp(&a.event.created_at).then(a.event.id.cmp(&b.event.id)));
        merged
    }

    /// `delete`: succeeds only when the stored event's pubkey equals
    /// `requester_pubkey`.
    pub async fn delete(&self, id: &str, requester_pubkey: &str) -> StoreResult<bool> {
        let mut index = self.index.write().await;
        let Some(stored) = index.by_id.get(id) else {
            return Ok(false);
        };
        if stored.event.pubkey != requester_pubkey {
            warn!(id, "delete refused: requester is not the event's author");
            return Ok(false);
        }

        sqlx::query("DELETE FROM events WHERE id = ?").bind(id).execute(&self.pool).await?;

        let stored = index.by_id.remove(id).expect("checked above");
        let category = kind_category(stored.event.kind);
        match category {
            KindCategory::Replaceable => {
                index.replaceable.remove(&(stored.event.pubkey.clone(), stored.event.kind));
            }
            KindCategory::Addressable => {
                index.addressable.remove(&(stored.event.pubkey.clone(), stored.event.kind, stored.event.d_tag_value()));
            }
            _ => {}
        }
        Ok(true)
    }
}

fn row_to_stored_event(row: &SqliteRow) -> StoreResult<StoredEvent> {
    let tags_blob: String = row.try_get("tags_blob")?;
    let tags: Vec<Vec<String>> = serde_json::from_str(&tags_blob)?;
    let event = SignedEvent {
        id: row.try_get("id")?,
        pubkey: row.try_get("pubkey")?,
        created_at: row.try_get("created_at")?,
        kind: {
            let kind: i64 = row.try_get("kind")?;
            kind as u32
        },
        tags,
        content: row.try_get("content")?,
        sig: row.try_get("sig")?,
    };
    let received_at: i64 = row.try_get("received_at")?;
    Ok(StoredEvent { event, received_at })
}
