//! Synchronization core: decides, per match id, between a full paginated
//! fetch of the recent-event history and a bounded incremental fetch, and
//! records the sync point that drives the next decision.

pub mod minute;
pub mod poller;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use crate::db::models::{MatchState, RecentRecord};
use crate::db::Database;
use crate::thesports::FetchError;

/// Source of the currently-live match id set.
#[async_trait]
pub trait LiveMatchSource: Send + Sync {
    async fn live_match_ids(&self) -> Result<Vec<String>, FetchError>;
}

/// Paginated recent-event history for one match. An empty page terminates
/// pagination.
#[async_trait]
pub trait RecentHistory: Send + Sync {
    async fn recent_page(
        &self,
        match_id: &str,
        page: u32,
        since: Option<i64>,
    ) -> Result<Vec<RecentRecord>, FetchError>;
}

/// Live detail snapshot for one match (opaque nested payload).
#[async_trait]
pub trait MatchDetails: Send + Sync {
    async fn match_detail(&self, match_id: &str) -> Result<serde_json::Value, FetchError>;
}

/// Durable per-match sync state, get/put per key.
pub trait StateStore: Send + Sync {
    fn get(&self, match_id: &str) -> Result<Option<MatchState>>;
    fn put(&self, state: &MatchState) -> Result<()>;
}

impl StateStore for Database {
    fn get(&self, match_id: &str) -> Result<Option<MatchState>> {
        self.get_match_state(match_id)
    }

    fn put(&self, state: &MatchState) -> Result<()> {
        self.upsert_match_state(state)
    }
}

/// Chooses and runs the fetch strategy for a match id.
///
/// No stored timestamp → full sync, paginated from page 1 until an empty
/// page. Stored timestamp → one incremental request bounded by it; the
/// incremental path never paginates (its result is assumed bounded in size).
///
/// On success the stored timestamp becomes the wall-clock time at fetch
/// completion, not anything derived from the records, so events arriving
/// mid-fetch may be re-delivered by the next sync (at-least-once).
pub struct Synchronizer {
    history: Arc<dyn RecentHistory>,
    store: Arc<dyn StateStore>,
}

impl Synchronizer {
    pub fn new(history: Arc<dyn RecentHistory>, store: Arc<dyn StateStore>) -> Self {
        Synchronizer { history, store }
    }

    /// Fetch the recent records this match id is owed, concatenated in
    /// request order. A fetch failure leaves the stored state untouched, so
    /// the next poll retries the same strategy.
    pub async fn synchronize(&self, match_id: &str) -> Result<Vec<RecentRecord>> {
        let prior = self
            .store
            .get(match_id)?
            .and_then(|state| state.last_sync_epoch);

        let records = match prior {
            None => self.full_sync(match_id).await?,
            Some(since) => self.incremental_sync(match_id, since).await?,
        };

        let completed_at = Utc::now().timestamp();
        self.store.put(&MatchState::new(match_id, completed_at))?;
        Ok(records)
    }

    async fn full_sync(&self, match_id: &str) -> Result<Vec<RecentRecord>, FetchError> {
        let mut all = Vec::new();
        let mut page = 1u32;
        loop {
            let batch = self.history.recent_page(match_id, page, None).await?;
            if batch.is_empty() {
                break;
            }
            all.extend(batch);
            page += 1;
        }
        debug!(
            "Full sync for {}: {} records over {} page(s)",
            match_id,
            all.len(),
            page
        );
        Ok(all)
    }

    async fn incremental_sync(
        &self,
        match_id: &str,
        since: i64,
    ) -> Result<Vec<RecentRecord>, FetchError> {
        let records = self.history.recent_page(match_id, 1, Some(since)).await?;
        debug!(
            "Incremental sync for {} since {}: {} records",
            match_id,
            since,
            records.len()
        );
        Ok(records)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// In-memory state store for unit tests.
    #[derive(Default)]
    pub struct MemoryStore {
        map: Mutex<HashMap<String, MatchState>>,
    }

    impl StateStore for MemoryStore {
        fn get(&self, match_id: &str) -> Result<Option<MatchState>> {
            Ok(self.map.lock().unwrap().get(match_id).cloned())
        }

        fn put(&self, state: &MatchState) -> Result<()> {
            self.map
                .lock()
                .unwrap()
                .insert(state.match_id.clone(), state.clone());
            Ok(())
        }
    }

    /// Scripted history mock: pops one response per request and logs the
    /// request parameters. Returns an empty page once the script runs out.
    pub struct ScriptedHistory {
        script: Mutex<VecDeque<Result<Vec<RecentRecord>, FetchError>>>,
        pub calls: Mutex<Vec<(String, u32, Option<i64>)>>,
    }

    impl ScriptedHistory {
        pub fn new(script: Vec<Result<Vec<RecentRecord>, FetchError>>) -> Self {
            ScriptedHistory {
                script: Mutex::new(script.into_iter().collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn records(n: usize) -> Vec<RecentRecord> {
            (0..n).map(|i| serde_json::json!({ "seq": i })).collect()
        }
    }

    #[async_trait]
    impl RecentHistory for ScriptedHistory {
        async fn recent_page(
            &self,
            match_id: &str,
            page: u32,
            since: Option<i64>,
        ) -> Result<Vec<RecentRecord>, FetchError> {
            self.calls
                .lock()
                .unwrap()
                .push((match_id.to_string(), page, since));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(vec![]))
        }
    }
}
