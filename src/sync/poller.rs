//! Poll orchestrator: discovers the live match set on an interval and runs
//! the synchronizer plus a detail-snapshot fetch for each match, isolating
//! per-match failures so one bad match never starves the rest of the cycle.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::db::models::LiveSnapshot;
use crate::sink::FeedEvent;
use crate::sync::{LiveMatchSource, MatchDetails, Synchronizer};

pub struct Poller {
    live: Arc<dyn LiveMatchSource>,
    details: Arc<dyn MatchDetails>,
    synchronizer: Synchronizer,
    events: mpsc::Sender<FeedEvent>,
}

impl Poller {
    pub fn new(
        live: Arc<dyn LiveMatchSource>,
        details: Arc<dyn MatchDetails>,
        synchronizer: Synchronizer,
        events: mpsc::Sender<FeedEvent>,
    ) -> Self {
        Poller {
            live,
            details,
            synchronizer,
            events,
        }
    }

    /// Run cycles at `poll_interval` until the shutdown signal flips.
    /// An overrunning cycle skips missed ticks instead of bursting.
    pub async fn run(&self, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!("Poller started (interval={:?})", poll_interval);
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_cycle().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Poller stopping");
                        return;
                    }
                }
            }
        }
    }

    /// One polling cycle. A discovery failure ends the cycle early; a
    /// failure on one match id is logged and the remaining ids still run.
    pub async fn run_cycle(&self) {
        let match_ids = match self.live.live_match_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Live-match discovery failed, skipping cycle: {}", e);
                return;
            }
        };

        if match_ids.is_empty() {
            debug!("No live matches this cycle");
            return;
        }

        for match_id in &match_ids {
            if let Err(e) = self.process_match(match_id).await {
                warn!("Match {} failed this cycle: {:#}", match_id, e);
            }
        }
    }

    async fn process_match(&self, match_id: &str) -> Result<()> {
        let records = self
            .synchronizer
            .synchronize(match_id)
            .await
            .context("recent-history sync failed")?;
        if !records.is_empty() {
            self.forward(FeedEvent::RecentRecords {
                match_id: match_id.to_string(),
                records,
            });
        }

        let detail = self
            .details
            .match_detail(match_id)
            .await
            .context("detail fetch failed")?;
        let team_ids = collect_team_ids(&detail);
        let snapshot =
            LiveSnapshot::from_detail(match_id, &detail, Utc::now().timestamp(), team_ids);
        self.forward(FeedEvent::Snapshot(snapshot));
        Ok(())
    }

    fn forward(&self, event: FeedEvent) {
        if let Err(e) = self.events.try_send(event) {
            error!("Feed channel full, event DROPPED: {}", e);
        }
    }
}

/// Collect the `id` of every sub-object keyed `home_team` or `away_team`,
/// anywhere in the detail payload. `serde_json::Value` already is the
/// object/array/scalar sum type, so this is a plain typed walk.
pub fn collect_team_ids(value: &serde_json::Value) -> Vec<String> {
    fn walk(value: &serde_json::Value, out: &mut Vec<String>) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, child) in map {
                    if key == "home_team" || key == "away_team" {
                        if let Some(id) = child.get("id") {
                            if let Some(s) = id.as_str() {
                                out.push(s.to_string());
                                continue;
                            }
                            if let Some(n) = id.as_u64() {
                                out.push(n.to_string());
                                continue;
                            }
                        }
                    }
                    walk(child, out);
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    walk(item, out);
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    walk(value, &mut out);
    out
}
