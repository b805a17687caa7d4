use crate::analytics::models::{AggregateCounters, VisitFact};
use crate::storage::{Counter, StorageResult, VisitStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use std::time::Duration;

/// Expiry marker for a timeline that has been appended to but never touched
const NEVER_EXPIRES: i64 = i64::MAX;

/// SQLite visit store
///
/// Mirrors the Redis layout with three tables: one row per visit, one row per
/// timeline holding its expiry, and named counters. Expired timelines are
/// invisible to every read and purged before the identity is written again.
pub struct SqliteVisitStore {
    pool: Arc<SqlitePool>,
}

impl SqliteVisitStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn decode(rows: Vec<sqlx::sqlite::SqliteRow>) -> StorageResult<Vec<VisitFact>> {
        rows.iter()
            .map(|row| {
                let payload: String = row.try_get("payload")?;
                Ok(serde_json::from_str(&payload)?)
            })
            .collect()
    }
}

#[async_trait]
impl VisitStore for SqliteVisitStore {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ip TEXT NOT NULL,
                score INTEGER NOT NULL,
                payload TEXT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_visits_ip_score ON visits(ip, score)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS timelines (
                ip TEXT PRIMARY KEY,
                expires_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS counters (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn append(&self, ip: &str, fact: &VisitFact) -> StorageResult<()> {
        let payload = serde_json::to_string(fact)?;
        let now = Self::now_ms();
        let mut tx = self.pool.begin().await?;

        // A timeline past its expiry is gone; the next write starts a fresh one
        sqlx::query(
            "DELETE FROM visits WHERE ip = ? AND EXISTS (SELECT 1 FROM timelines WHERE ip = ? AND expires_at <= ?)",
        )
        .bind(ip)
        .bind(ip)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM timelines WHERE ip = ? AND expires_at <= ?")
            .bind(ip)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO timelines (ip, expires_at) VALUES (?, ?) ON CONFLICT(ip) DO NOTHING")
            .bind(ip)
            .bind(NEVER_EXPIRES)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO visits (ip, score, payload) VALUES (?, ?, ?)")
            .bind(ip)
            .bind(fact.score())
            .bind(payload)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn touch(&self, ip: &str, ttl: Duration) -> StorageResult<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = Self::now_ms().saturating_add(ttl_ms);

        // Like EXPIRE on a missing key, touching an unknown timeline is a no-op
        sqlx::query("UPDATE timelines SET expires_at = ? WHERE ip = ?")
            .bind(expires_at)
            .bind(ip)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn increment(&self, counter: Counter) -> StorageResult<u64> {
        let row = sqlx::query(
            r#"
            INSERT INTO counters (name, value) VALUES (?, 1)
            ON CONFLICT(name) DO UPDATE SET value = value + 1
            RETURNING value
            "#,
        )
        .bind(counter.key())
        .fetch_one(self.pool.as_ref())
        .await?;

        let value: i64 = row.try_get("value")?;
        Ok(value.max(0) as u64)
    }

    async fn range(&self, ip: &str, from_ms: i64, to_ms: i64) -> StorageResult<Vec<VisitFact>> {
        let rows = sqlx::query(
            r#"
            SELECT v.payload FROM visits v
            JOIN timelines t ON t.ip = v.ip
            WHERE v.ip = ? AND t.expires_at > ? AND v.score BETWEEN ? AND ?
            ORDER BY v.score ASC, v.id ASC
            "#,
        )
        .bind(ip)
        .bind(Self::now_ms())
        .bind(from_ms)
        .bind(to_ms)
        .fetch_all(self.pool.as_ref())
        .await?;

        Self::decode(rows)
    }

    async fn history(&self, ip: &str) -> StorageResult<Vec<VisitFact>> {
        let rows = sqlx::query(
            r#"
            SELECT v.payload FROM visits v
            JOIN timelines t ON t.ip = v.ip
            WHERE v.ip = ? AND t.expires_at > ?
            ORDER BY v.score ASC, v.id ASC
            "#,
        )
        .bind(ip)
        .bind(Self::now_ms())
        .fetch_all(self.pool.as_ref())
        .await?;

        Self::decode(rows)
    }

    async fn identities(&self) -> StorageResult<Vec<String>> {
        let rows = sqlx::query("SELECT ip FROM timelines WHERE expires_at > ? ORDER BY ip")
            .bind(Self::now_ms())
            .fetch_all(self.pool.as_ref())
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("ip").map_err(Into::into))
            .collect()
    }

    async fn counters(&self) -> StorageResult<AggregateCounters> {
        let rows = sqlx::query("SELECT name, value FROM counters")
            .fetch_all(self.pool.as_ref())
            .await?;

        let mut counters = AggregateCounters::default();
        for row in rows {
            let name: String = row.try_get("name")?;
            let value: i64 = row.try_get("value")?;
            let value = value.max(0) as u64;

            if name == Counter::TotalVisits.key() {
                counters.total_visits = value;
            } else if name == Counter::MobileVisits.key() {
                counters.mobile_visits = value;
            }
        }

        Ok(counters)
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::models::DIRECT_REFERRER;
    use chrono::TimeZone;

    async fn create_store() -> SqliteVisitStore {
        let store = SqliteVisitStore::new("sqlite::memory:", 1).await.unwrap();
        store.init().await.unwrap();
        store
    }

    fn fact(ip: &str, millis: i64) -> VisitFact {
        VisitFact {
            ip: ip.to_string(),
            device: "iPhone".to_string(),
            os: "iOS 17.1".to_string(),
            browser: "Mobile Safari 17.1".to_string(),
            is_mobile: true,
            geo: None,
            path: "/".to_string(),
            referrer: DIRECT_REFERRER.to_string(),
            timestamp: Utc.timestamp_millis_opt(millis).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let store = create_store().await;
        store.init().await.unwrap();
        assert!(store.identities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_is_ordered_by_score_not_arrival() {
        let store = create_store().await;
        let now = Utc::now().timestamp_millis();

        store.append("1.2.3.4", &fact("1.2.3.4", now - 10)).await.unwrap();
        store.append("1.2.3.4", &fact("1.2.3.4", now - 30)).await.unwrap();
        store.append("1.2.3.4", &fact("1.2.3.4", now - 20)).await.unwrap();

        let scores: Vec<i64> = store
            .history("1.2.3.4")
            .await
            .unwrap()
            .iter()
            .map(VisitFact::score)
            .collect();
        assert_eq!(scores, vec![now - 30, now - 20, now - 10]);
    }

    #[tokio::test]
    async fn test_counters_start_at_zero_and_increment() {
        let store = create_store().await;
        assert_eq!(store.counters().await.unwrap(), AggregateCounters::default());

        assert_eq!(store.increment(Counter::TotalVisits).await.unwrap(), 1);
        assert_eq!(store.increment(Counter::TotalVisits).await.unwrap(), 2);
        assert_eq!(store.increment(Counter::MobileVisits).await.unwrap(), 1);

        let counters = store.counters().await.unwrap();
        assert_eq!(counters.total_visits, 2);
        assert_eq!(counters.mobile_visits, 1);
    }

    #[tokio::test]
    async fn test_expired_timeline_is_hidden_then_restarted() {
        let store = create_store().await;
        let now = Utc::now().timestamp_millis();

        store.append("5.6.7.8", &fact("5.6.7.8", now - 1_000)).await.unwrap();
        store.touch("5.6.7.8", Duration::ZERO).await.unwrap();

        assert!(store.identities().await.unwrap().is_empty());
        assert!(store.history("5.6.7.8").await.unwrap().is_empty());

        store.append("5.6.7.8", &fact("5.6.7.8", now)).await.unwrap();
        store.touch("5.6.7.8", Duration::from_secs(60)).await.unwrap();

        let history = store.history("5.6.7.8").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].score(), now);
        assert_eq!(store.identities().await.unwrap(), vec!["5.6.7.8".to_string()]);
    }

    #[tokio::test]
    async fn test_touch_unknown_timeline_is_noop() {
        let store = create_store().await;
        store.touch("9.9.9.9", Duration::from_secs(60)).await.unwrap();
        assert!(store.identities().await.unwrap().is_empty());
    }
}
