//! Visitor analytics
//!
//! Turns requests into [`models::VisitFact`]s on the write path and turns
//! stored timelines back into dashboard data on the read path.

pub mod aggregator;
pub mod export;
pub mod extractor;
pub mod geoip;
pub mod ip_extractor;
pub mod models;
pub mod query;
pub mod user_agent;

pub use aggregator::{DashboardCharts, TimeRange, UnknownRange};
pub use export::export_csv;
pub use extractor::FactExtractor;
pub use geoip::GeoIpService;
pub use ip_extractor::{client_identity, extract_client_ip};
pub use models::{AggregateCounters, ChartSeries, GeoLocation, VisitFact, Visitor};
pub use query::{load_all_visitors, load_visitors};
pub use user_agent::{AgentInfo, UserAgentClassifier};
