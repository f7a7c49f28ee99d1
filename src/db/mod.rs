use anyhow::Result;
use chrono::{Duration, Utc};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};
use tracing::warn;

pub mod models;
use models::MatchState;

/// Thread-safe SQLite connection pool (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Match sync state ─────────────────────────────────────────────────────

    /// Load the sync state for a match id.
    ///
    /// A row that cannot be decoded is logged and reported as absent, so the
    /// next synchronization falls back to a full fetch instead of failing.
    pub fn get_match_state(&self, match_id: &str) -> Result<Option<MatchState>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT match_id, last_sync_epoch, updated_at FROM match_state WHERE match_id = ?1",
        )?;
        match stmt.query_row(params![match_id], map_match_state) {
            Ok(state) => Ok(Some(state)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => {
                warn!(
                    "Unreadable sync state for match {} (forcing full resync): {}",
                    match_id, e
                );
                Ok(None)
            }
        }
    }

    /// Overwrite the sync state for a match id.
    ///
    /// The stored timestamp never moves backward: a concurrent writer that
    /// finished later keeps the larger value.
    pub fn upsert_match_state(&self, state: &MatchState) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO match_state (match_id, last_sync_epoch, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(match_id) DO UPDATE SET
                last_sync_epoch = MAX(
                    COALESCE(match_state.last_sync_epoch, 0),
                    COALESCE(excluded.last_sync_epoch, 0)
                ),
                updated_at = excluded.updated_at",
            params![state.match_id, state.last_sync_epoch, state.updated_at],
        )?;
        Ok(())
    }

    /// Delete sync state not written for `retention_days`. Matches that went
    /// off the live list stop being written and age out here.
    pub fn prune_match_state(&self, retention_days: u64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(retention_days as i64);
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM match_state WHERE updated_at < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }

    /// Number of tracked match ids (diagnostics)
    pub fn count_match_states(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row("SELECT COUNT(*) FROM match_state", [], |r| r.get(0))?;
        Ok(count)
    }
}

fn map_match_state(row: &rusqlite::Row) -> rusqlite::Result<MatchState> {
    Ok(MatchState {
        match_id: row.get(0)?,
        last_sync_epoch: row.get(1)?,
        updated_at: row.get(2)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS match_state (
    match_id        TEXT    PRIMARY KEY,
    last_sync_epoch INTEGER,
    updated_at      TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_match_state_updated ON match_state(updated_at);
"#;
