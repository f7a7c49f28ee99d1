use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;

use crate::db::models::RecentRecord;
use crate::sync::{LiveMatchSource, MatchDetails, RecentHistory};

/// Failure modes of a single provider request. `Transport` and `Decode` are
/// handled identically upstream (skip this unit of work, retry next cycle);
/// they are kept apart for logging.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned HTTP {0}")]
    Status(StatusCode),
    #[error("malformed response body: {0}")]
    Decode(String),
}

/// Client for the TheSports football REST API.
///
/// Endpoints used:
/// - `/match/detail_live` — live-match list (no uuid) and per-match detail
/// - `/match/recent/list` — paginated recent-event history
#[derive(Clone)]
pub struct TheSportsClient {
    http: Client,
    base_url: String,
    user: String,
    secret: String,
}

impl TheSportsClient {
    pub fn new(base_url: &str, user: &str, secret: &str) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(TheSportsClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            secret: secret.to_string(),
        })
    }

    /// Issue a GET and decode the body as JSON, mapping each failure mode to
    /// its `FetchError` variant.
    async fn get_json(
        &self,
        path: &str,
        extra: &[(&str, String)],
    ) -> Result<serde_json::Value, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} ({} extra params)", url, extra.len());

        let mut query: Vec<(&str, String)> = vec![
            ("user", self.user.clone()),
            ("secret", self.secret.clone()),
        ];
        query.extend(extra.iter().cloned());

        let resp = self.http.get(&url).query(&query).send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status()));
        }

        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl LiveMatchSource for TheSportsClient {
    async fn live_match_ids(&self) -> Result<Vec<String>, FetchError> {
        let raw = self.get_json("/match/detail_live", &[]).await?;
        Ok(extract_match_ids(&raw))
    }
}

#[async_trait]
impl RecentHistory for TheSportsClient {
    async fn recent_page(
        &self,
        match_id: &str,
        page: u32,
        since: Option<i64>,
    ) -> Result<Vec<RecentRecord>, FetchError> {
        let mut extra = vec![
            ("uuid", match_id.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(since) = since {
            extra.push(("time", since.to_string()));
        }
        let raw = self.get_json("/match/recent/list", &extra).await?;
        match raw.get("results") {
            Some(serde_json::Value::Array(records)) => Ok(records.clone()),
            Some(serde_json::Value::Null) | None => Ok(vec![]),
            Some(other) => Err(FetchError::Decode(format!(
                "expected results array, got {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl MatchDetails for TheSportsClient {
    async fn match_detail(&self, match_id: &str) -> Result<serde_json::Value, FetchError> {
        self.get_json("/match/detail_live", &[("uuid", match_id.to_string())])
            .await
    }
}

/// Pull the `id` field out of every record in the live-list response.
fn extract_match_ids(raw: &serde_json::Value) -> Vec<String> {
    let results = match raw.get("results").and_then(|r| r.as_array()) {
        Some(a) => a,
        None => return vec![],
    };
    results
        .iter()
        .filter_map(|m| {
            m.get("id").and_then(|id| {
                id.as_str()
                    .map(|s| s.to_string())
                    .or_else(|| id.as_u64().map(|n| n.to_string()))
            })
        })
        .collect()
}
