use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An event/statistic record from the provider's recent-history endpoint.
///
/// The sync layer never looks inside one of these beyond noticing an empty
/// page; the payload shape is owned by the provider.
pub type RecentRecord = serde_json::Value;

/// Per-match synchronization state, one row per match id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchState {
    /// Provider-assigned match id (opaque, immutable)
    pub match_id: String,
    /// Epoch seconds of the last successful sync; `None` until the first one
    pub last_sync_epoch: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl MatchState {
    pub fn new(match_id: &str, last_sync_epoch: i64) -> Self {
        MatchState {
            match_id: match_id.to_string(),
            last_sync_epoch: Some(last_sync_epoch),
            updated_at: Utc::now(),
        }
    }
}

/// Point-in-time view of a live match as read from the detail endpoint.
/// Recomputed on every poll, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct LiveSnapshot {
    pub match_id: String,
    /// Epoch seconds of the first-half kickoff (0 if not yet known)
    pub kickoff_first: i64,
    /// Epoch seconds of the second-half kickoff (0 until the second half)
    pub kickoff_second: i64,
    /// Current match minute as computed from the kickoff timestamps;
    /// `None` when both kickoffs are unset
    pub minute: Option<i64>,
    pub score: serde_json::Value,
    pub incidents: Vec<serde_json::Value>,
    pub stats: Vec<serde_json::Value>,
    /// Team ids found nested in the detail payload
    pub team_ids: Vec<String>,
}
