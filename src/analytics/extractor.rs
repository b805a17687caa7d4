//! Visit fact extraction
//!
//! Turns the headers of an inbound request into a [`VisitFact`]. Extraction
//! never fails: unknown agents, missing headers and geo misses all degrade to
//! sentinel values.

use axum::http::{header, HeaderMap};
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use std::net::IpAddr;

use crate::analytics::geoip::GeoIpService;
use crate::analytics::ip_extractor::{client_identity, extract_client_ip};
use crate::analytics::models::{VisitFact, DIRECT_REFERRER};
use crate::analytics::user_agent::UserAgentClassifier;
use crate::config::TrackingConfig;

pub struct FactExtractor {
    config: TrackingConfig,
    classifier: UserAgentClassifier,
    geoip: GeoIpService,
}

impl FactExtractor {
    pub fn new(config: TrackingConfig, classifier: UserAgentClassifier, geoip: GeoIpService) -> Self {
        Self {
            config,
            classifier,
            geoip,
        }
    }

    /// Extractor without lookup databases
    pub fn basic(config: TrackingConfig) -> Self {
        Self::new(config, UserAgentClassifier::new(), GeoIpService::default())
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn extract(
        &self,
        headers: &HeaderMap,
        socket_addr: Option<IpAddr>,
        path: &str,
        now: DateTime<Utc>,
    ) -> VisitFact {
        let client_ip = extract_client_ip(headers, socket_addr, &self.config);

        // Geolocate the real address, before anonymization drops precision
        let geo = client_ip.and_then(|ip| self.geoip.lookup(ip));
        let ip = client_identity(client_ip, self.config.ip_anonymization);

        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok());
        let agent = self.classifier.classify(user_agent);

        let referrer = headers
            .get(header::REFERER)
            .and_then(|h| h.to_str().ok())
            .filter(|r| !r.is_empty())
            .unwrap_or(DIRECT_REFERRER)
            .to_string();

        VisitFact {
            ip,
            device: agent.device,
            os: agent.os,
            browser: agent.browser,
            is_mobile: agent.is_mobile,
            geo,
            path: path.to_string(),
            referrer,
            timestamp: truncate_to_millis(now),
        }
    }
}

/// Stored timestamps carry millisecond precision so they agree with the score
fn truncate_to_millis(now: DateTime<Utc>) -> DateTime<Utc> {
    now.duration_trunc(TimeDelta::milliseconds(1)).unwrap_or(now)
}
