//! Match-minute calculation and live-snapshot extraction.

use crate::db::models::LiveSnapshot;

/// Current match minute from kickoff epochs and the current time.
///
/// The second half is active iff `now >= kickoff_second` and a second-half
/// kickoff exists (`> 0`); otherwise the first half is assumed. First-half
/// minute is `floor((now - kickoff_first) / 60) + 1`; the second half adds
/// the 45 first-half minutes on top of the same formula against
/// `kickoff_second`.
///
/// Deliberately unclamped: before kickoff this goes negative, deep into
/// stoppage time it exceeds 90. Callers wanting a display value must
/// sanitize it themselves, and must not call this with both kickoffs unset.
pub fn match_minute(now: i64, kickoff_first: i64, kickoff_second: i64) -> i64 {
    let second_half = kickoff_second > 0 && now >= kickoff_second;
    if second_half {
        (now - kickoff_second).div_euclid(60) + 1 + 45
    } else {
        (now - kickoff_first).div_euclid(60) + 1
    }
}

impl LiveSnapshot {
    /// Read the snapshot fields out of a detail payload, annotating it with
    /// the computed match minute. Unknown or missing fields degrade to
    /// empty/zero values; the payload shape is the provider's to change.
    pub fn from_detail(
        match_id: &str,
        detail: &serde_json::Value,
        now: i64,
        team_ids: Vec<String>,
    ) -> Self {
        let kickoff_first = detail
            .get("kickoff_first")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let kickoff_second = detail
            .get("kickoff_second")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);

        let minute = if kickoff_first > 0 || kickoff_second > 0 {
            Some(match_minute(now, kickoff_first, kickoff_second))
        } else {
            None
        };

        let list = |key: &str| -> Vec<serde_json::Value> {
            detail
                .get(key)
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default()
        };

        LiveSnapshot {
            match_id: match_id.to_string(),
            kickoff_first,
            kickoff_second,
            minute,
            score: detail.get("score").cloned().unwrap_or(serde_json::Value::Null),
            incidents: list("incidents"),
            stats: list("stats"),
            team_ids,
        }
    }
}
