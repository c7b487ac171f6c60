// src/suppression.rs
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::candidate::CandidateKind;
use crate::storage::KvStore;

pub const SUPPRESSION_KEY: &str = "popup_seen";
pub const DEFAULT_SUPPRESSION_TTL_SECS: i64 = 8 * 3600;

/// Last popup the user dismissed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressionRecord {
    pub id: String,
    pub kind: CandidateKind,
    pub shown_at: DateTime<Utc>,
}

/// Persisted shape: `{"id": "...", "type": "notice"|"event", "timestamp": <epoch ms>}`.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    id: String,
    #[serde(rename = "type")]
    kind: CandidateKind,
    timestamp: i64,
}

/// Rate limit for popups across visits.
/// - Nothing stored: show.
/// - Same item stored: never re-show while the record lives.
/// - Different item stored: blocked until the TTL has elapsed.
///
/// Records are only written by `write` and removed by `clear`. `should_show`
/// never writes one, though the backend may drop an expired entry while reading.
#[derive(Clone)]
pub struct SuppressionStore {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl SuppressionStore {
    /// `ttl_secs` <= 0 falls back to the default 8 hours.
    pub fn new(kv: Arc<dyn KvStore>, ttl_secs: i64) -> Self {
        let secs = if ttl_secs > 0 {
            ttl_secs
        } else {
            DEFAULT_SUPPRESSION_TTL_SECS
        };
        Self {
            kv,
            ttl: Duration::seconds(secs),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current record, or `None` when absent, expired, or unparsable.
    pub fn read(&self, now: DateTime<Utc>) -> Option<SuppressionRecord> {
        let raw = self.kv.get(SUPPRESSION_KEY, now)?;
        let stored: StoredRecord = match serde_json::from_str(&raw) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(target: "popup::store", error = %e, "corrupt suppression record, ignoring");
                return None;
            }
        };
        let Some(shown_at) = Utc.timestamp_millis_opt(stored.timestamp).single() else {
            tracing::warn!(target: "popup::store", ts = stored.timestamp, "suppression timestamp out of range, ignoring");
            return None;
        };
        Some(SuppressionRecord {
            id: stored.id,
            kind: stored.kind,
            shown_at,
        })
    }

    /// Replace the stored record. The backend entry expires at `now + ttl`.
    pub fn write(&self, id: &str, kind: CandidateKind, now: DateTime<Utc>) -> Result<()> {
        let stored = StoredRecord {
            id: id.to_string(),
            kind,
            timestamp: now.timestamp_millis(),
        };
        let json = serde_json::to_string(&stored).context("serializing suppression record")?;
        self.kv
            .set(SUPPRESSION_KEY, &json, now + self.ttl)
            .context("persisting suppression record")?;
        tracing::info!(target: "popup::store", id, kind = kind.as_str(), "suppression recorded");
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.kv
            .remove(SUPPRESSION_KEY)
            .context("clearing suppression record")
    }

    pub fn should_show(&self, id: &str, kind: CandidateKind, now: DateTime<Utc>) -> bool {
        let Some(rec) = self.read(now) else {
            return true;
        };
        if rec.id == id && rec.kind == kind {
            tracing::debug!(target: "popup::store", id, "same item already dismissed");
            return false;
        }
        if now - rec.shown_at < self.ttl {
            tracing::debug!(target: "popup::store", id, last = %rec.id, "inside suppression window");
            return false;
        }
        true
    }
}
