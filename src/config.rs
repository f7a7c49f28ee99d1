use clap::Parser;

/// TheSports live-match synchronization service
#[derive(Parser, Debug, Clone)]
#[command(name = "matchsync", version, about)]
pub struct Config {
    /// TheSports API account name
    #[arg(long, env = "THESPORTS_USER")]
    pub user: String,

    /// TheSports API secret key
    #[arg(long, env = "THESPORTS_SECRET")]
    pub secret: String,

    /// TheSports REST API base URL
    #[arg(
        long,
        env = "THESPORTS_API_URL",
        default_value = "https://api.thesports.com/v1/football"
    )]
    pub api_url: String,

    /// Push-stream WebSocket URL
    #[arg(
        long,
        env = "THESPORTS_STREAM_URL",
        default_value = "wss://mq.thesports.com"
    )]
    pub stream_url: String,

    /// Push-stream subscription topic
    #[arg(
        long,
        env = "THESPORTS_STREAM_TOPIC",
        default_value = "thesports/football/match/v1"
    )]
    pub stream_topic: String,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "matchsync.db")]
    pub database_path: String,

    /// Live-match polling interval in seconds
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value = "2")]
    pub poll_interval_secs: u64,

    /// Delay between stream reconnect attempts in seconds
    #[arg(long, env = "RECONNECT_BACKOFF_SECS", default_value = "5")]
    pub reconnect_backoff_secs: u64,

    /// Days to retain per-match sync state after its last write
    #[arg(long, env = "STATE_RETENTION_DAYS", default_value = "7")]
    pub state_retention_days: u64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.user.trim().is_empty() {
            anyhow::bail!("THESPORTS_USER must not be empty");
        }
        if self.secret.trim().is_empty() {
            anyhow::bail!("THESPORTS_SECRET must not be empty");
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be at least 1");
        }
        if self.state_retention_days == 0 {
            anyhow::bail!("state_retention_days must be at least 1");
        }
        Ok(())
    }
}
