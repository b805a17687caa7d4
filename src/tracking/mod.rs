//! Per-request visit tracking
//!
//! The [`Tracker`] bundles everything the write path needs: the fact
//! extractor, the visit store and the live broadcaster. The middleware in
//! [`middleware`] calls it once per request.

pub mod middleware;

use axum::http::HeaderMap;
use chrono::Utc;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::analytics::extractor::FactExtractor;
use crate::analytics::models::{format_timestamp, VisitFact};
use crate::live::{LiveBroadcaster, LiveEvent};
use crate::storage::VisitStore;

pub use middleware::{mobile_viewport_hint, track_visit};

pub struct Tracker {
    extractor: FactExtractor,
    store: Arc<dyn VisitStore>,
    live: Arc<LiveBroadcaster>,
}

impl Tracker {
    pub fn new(
        extractor: FactExtractor,
        store: Arc<dyn VisitStore>,
        live: Arc<LiveBroadcaster>,
    ) -> Self {
        Self {
            extractor,
            store,
            live,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.extractor.config().enabled
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.extractor.config().visitor_ttl_secs)
    }

    /// Build the visit fact for a request
    pub fn extract(&self, headers: &HeaderMap, socket_ip: Option<IpAddr>, path: &str) -> VisitFact {
        self.extractor.extract(headers, socket_ip, path, Utc::now())
    }

    /// Store the visit and announce it to live dashboards
    ///
    /// Never fails: storage faults are logged by the store, and the broadcast
    /// only happens once the visit is actually in the timeline.
    pub async fn persist(&self, fact: VisitFact) {
        if self.store.record(&fact, self.ttl()).await {
            self.live.notify(&LiveEvent::NewVisit {
                ip: fact.ip,
                timestamp: format_timestamp(&fact.timestamp),
            });
        }
    }

    /// Persist on a background task so the response never waits on it
    pub fn spawn_persist(self: &Arc<Self>, fact: VisitFact) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            tracker.persist(fact).await;
        })
    }
}
