//! Redis-backed visit store
//!
//! Layout:
//! - `visitor:{ip}` sorted set, member = JSON visit, score = epoch millis
//! - `total:visits`, `mobile:visits` integer counters
//!
//! Timelines expire through the key TTL, refreshed on every write.

use crate::analytics::models::{AggregateCounters, VisitFact};
use crate::storage::{Counter, StorageResult, VisitStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::info;

const VISITOR_PREFIX: &str = "visitor:";

pub struct RedisVisitStore {
    connection: ConnectionManager,
}

impl RedisVisitStore {
    /// Connect to Redis; fails when the server cannot be reached
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .with_context(|| format!("invalid redis url '{redis_url}'"))?;
        let connection = ConnectionManager::new(client)
            .await
            .context("failed to connect to redis")?;

        Ok(Self { connection })
    }

    fn visitor_key(ip: &str) -> String {
        format!("{VISITOR_PREFIX}{ip}")
    }

    fn decode(members: Vec<String>) -> StorageResult<Vec<VisitFact>> {
        members
            .iter()
            .map(|member| serde_json::from_str(member).map_err(Into::into))
            .collect()
    }
}

#[async_trait]
impl VisitStore for RedisVisitStore {
    async fn init(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("redis did not answer PING")?;
        Ok(())
    }

    async fn append(&self, ip: &str, fact: &VisitFact) -> StorageResult<()> {
        let member = serde_json::to_string(fact)?;
        let mut conn = self.connection.clone();
        let _: i64 = conn
            .zadd(Self::visitor_key(ip), member, fact.score())
            .await?;
        Ok(())
    }

    async fn touch(&self, ip: &str, ttl: Duration) -> StorageResult<()> {
        let mut conn = self.connection.clone();
        let seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let _: bool = conn.expire(Self::visitor_key(ip), seconds).await?;
        Ok(())
    }

    async fn increment(&self, counter: Counter) -> StorageResult<u64> {
        let mut conn = self.connection.clone();
        let value: u64 = conn.incr(counter.key(), 1u64).await?;
        Ok(value)
    }

    async fn range(&self, ip: &str, from_ms: i64, to_ms: i64) -> StorageResult<Vec<VisitFact>> {
        let mut conn = self.connection.clone();
        let members: Vec<String> = conn
            .zrangebyscore(Self::visitor_key(ip), from_ms, to_ms)
            .await?;
        Self::decode(members)
    }

    async fn history(&self, ip: &str) -> StorageResult<Vec<VisitFact>> {
        let mut conn = self.connection.clone();
        let members: Vec<String> = conn.zrange(Self::visitor_key(ip), 0, -1).await?;
        Self::decode(members)
    }

    async fn identities(&self) -> StorageResult<Vec<String>> {
        let mut conn = self.connection.clone();
        let keys: Vec<String> = conn.keys(format!("{VISITOR_PREFIX}*")).await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(VISITOR_PREFIX).map(str::to_string))
            .collect())
    }

    async fn counters(&self) -> StorageResult<AggregateCounters> {
        let mut conn = self.connection.clone();
        let total: Option<u64> = conn.get(Counter::TotalVisits.key()).await?;
        let mobile: Option<u64> = conn.get(Counter::MobileVisits.key()).await?;

        Ok(AggregateCounters {
            total_visits: total.unwrap_or(0),
            mobile_visits: mobile.unwrap_or(0),
        })
    }

    async fn close(&self) -> Result<()> {
        // The manager's connection closes when the last clone is dropped
        info!("Releasing redis connection");
        Ok(())
    }
}
