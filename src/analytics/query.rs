//! Read-side queries that assemble visitors from the store

use chrono::{DateTime, Utc};

use super::aggregator::{sort_by_recent, TimeRange};
use super::models::Visitor;
use crate::storage::{StorageResult, VisitStore};

/// Visitors with at least one visit inside `range`, most recent first
pub async fn load_visitors(
    store: &dyn VisitStore,
    range: TimeRange,
    now: DateTime<Utc>,
) -> StorageResult<Vec<Visitor>> {
    let from_ms = range.cutoff(now).timestamp_millis();
    let to_ms = now.timestamp_millis();

    let mut visitors = Vec::new();
    for ip in store.identities().await? {
        let visits = store.range(&ip, from_ms, to_ms).await?;
        if !visits.is_empty() {
            visitors.push(Visitor { ip, visits });
        }
    }

    sort_by_recent(&mut visitors);
    Ok(visitors)
}

/// Full history of every live identity, in identity order
pub async fn load_all_visitors(store: &dyn VisitStore) -> StorageResult<Vec<Visitor>> {
    let mut visitors = Vec::new();
    for ip in store.identities().await? {
        let visits = store.history(&ip).await?;
        visitors.push(Visitor { ip, visits });
    }
    Ok(visitors)
}
