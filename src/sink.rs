//! Shared downstream sink. Both the poll path and the push stream feed the
//! same mpsc channel; a single consuming task keeps the sink trivially safe
//! under concurrency and easy to swap for a real consumer later.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::db::models::{LiveSnapshot, RecentRecord};

/// Best-effort decoded payload of a push-stream message.
#[derive(Debug, Clone)]
pub enum StreamPayload {
    Json(serde_json::Value),
    Text(String),
}

/// Everything the ingest paths produce.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    RecentRecords {
        match_id: String,
        records: Vec<RecentRecord>,
    },
    Snapshot(LiveSnapshot),
    StreamMessage {
        topic: String,
        payload: StreamPayload,
    },
}

pub fn channel() -> (mpsc::Sender<FeedEvent>, mpsc::Receiver<FeedEvent>) {
    mpsc::channel(1024)
}

/// Consume feed events and log them. Exits when every producer is gone.
pub fn spawn_log_sink(mut rx: mpsc::Receiver<FeedEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                FeedEvent::RecentRecords { match_id, records } => {
                    info!("Match {}: {} recent record(s)", match_id, records.len());
                }
                FeedEvent::Snapshot(snap) => {
                    info!(
                        "Match {} minute={:?} score={} incidents={} stats={} teams={:?}",
                        snap.match_id,
                        snap.minute,
                        snap.score,
                        snap.incidents.len(),
                        snap.stats.len(),
                        snap.team_ids
                    );
                }
                FeedEvent::StreamMessage { topic, payload } => match payload {
                    StreamPayload::Json(value) => info!("Stream [{}]: {}", topic, value),
                    StreamPayload::Text(text) => info!("Stream [{}] (raw): {}", topic, text),
                },
            }
        }
    })
}
