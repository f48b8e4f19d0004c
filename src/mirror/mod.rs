use crate::models::TradeRecord;
use crate::Result;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::HashSet;
use tokio::time::{timeout, Duration};

/// Redis mirror of closed trades, bucketed by ISO week.
///
/// Best-effort secondary copy; Postgres stays the source of truth. Each
/// week gets its own list so old buckets can be expired independently.
pub struct TradeMirror {
    conn: ConnectionManager,
    known_weeks: HashSet<String>,
}

impl TradeMirror {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        // Add 5 second timeout to connection attempt
        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| "Redis connection timeout after 5 seconds")??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            conn,
            known_weeks: HashSet::new(),
        })
    }

    /// Append a finished trade to the current week's bucket.
    pub async fn append(&mut self, record: &TradeRecord) -> Result<()> {
        let week = current_week_label();
        self.ensure_week(&week).await?;

        let key = format!("mirror:trades:{week}");
        let value = serde_json::to_string(record)?;
        self.conn.rpush::<_, _, ()>(&key, value).await?;

        tracing::debug!("Mirrored trade {} into {}", record.id, key);

        Ok(())
    }

    /// Register the week bucket in the index set, once per process per week.
    async fn ensure_week(&mut self, week: &str) -> Result<()> {
        if self.known_weeks.contains(week) {
            return Ok(());
        }
        self.conn
            .sadd::<_, _, ()>("mirror:weeks", week)
            .await?;
        self.known_weeks.insert(week.to_string());
        Ok(())
    }
}

/// ISO week label, e.g. "2026-W35".
fn current_week_label() -> String {
    chrono::Utc::now().format("%G-W%V").to_string()
}
