//! Chart aggregation over visitor timelines
//!
//! Every series is built the same way: group by one dimension, count, sort
//! descending by count and keep the top N. The sort is stable, so labels with
//! equal counts keep the order in which they were first seen.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::analytics::models::{ChartSeries, Visitor};

pub const TOP_DEVICES: usize = 5;
pub const TOP_LOCATIONS: usize = 10;
pub const TOP_PATHS: usize = 10;
pub const RECENT_VISITORS: usize = 10;

/// Named time window for visitor queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeRange {
    Day,
    #[default]
    Week,
    Month,
    All,
}

impl TimeRange {
    /// Earliest instant included in the window
    pub fn cutoff(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            TimeRange::Day => now - TimeDelta::seconds(86_400),
            TimeRange::Week => now - TimeDelta::seconds(604_800),
            TimeRange::Month => now - TimeDelta::seconds(2_592_000),
            TimeRange::All => DateTime::UNIX_EPOCH,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::Day => "24h",
            TimeRange::Week => "7d",
            TimeRange::Month => "30d",
            TimeRange::All => "all",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown range '{0}', expected one of 24h, 7d, 30d, all")]
pub struct UnknownRange(pub String);

impl FromStr for TimeRange {
    type Err = UnknownRange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "24h" => Ok(TimeRange::Day),
            "7d" => Ok(TimeRange::Week),
            "30d" => Ok(TimeRange::Month),
            "all" => Ok(TimeRange::All),
            other => Err(UnknownRange(other.to_string())),
        }
    }
}

/// All dashboard charts for one set of visitors
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCharts {
    pub devices: ChartSeries,
    pub locations: ChartSeries,
    pub paths: ChartSeries,
    pub recent_visitors: Vec<Visitor>,
}

impl DashboardCharts {
    /// `visitors` must already be ordered most recent first
    pub fn build(visitors: &[Visitor]) -> Self {
        Self {
            devices: device_series(visitors),
            locations: location_series(visitors),
            paths: path_series(visitors),
            recent_visitors: visitors.iter().take(RECENT_VISITORS).cloned().collect(),
        }
    }
}

/// Count every visit's device across all visitors, top 5
pub fn device_series(visitors: &[Visitor]) -> ChartSeries {
    rank(
        visitors
            .iter()
            .flat_map(|v| v.visits.iter())
            .map(|visit| visit.device_label().to_string()),
        TOP_DEVICES,
    )
}

/// One location sample per visitor, taken from its first visit, top 10
pub fn location_series(visitors: &[Visitor]) -> ChartSeries {
    rank(
        visitors
            .iter()
            .filter_map(|v| v.first_visit())
            .map(|visit| visit.location_label()),
        TOP_LOCATIONS,
    )
}

/// Count every visit's path across all visitors, top 10
pub fn path_series(visitors: &[Visitor]) -> ChartSeries {
    rank(
        visitors
            .iter()
            .flat_map(|v| v.visits.iter())
            .map(|visit| visit.path_label().to_string()),
        TOP_PATHS,
    )
}

/// Order visitors by their most recent visit, newest first
///
/// Visitors without visits sort last.
pub fn sort_by_recent(visitors: &mut [Visitor]) {
    visitors.sort_by(|a, b| {
        let a_last = a.last_visit().map(|v| v.timestamp);
        let b_last = b.last_visit().map(|v| v.timestamp);
        b_last.cmp(&a_last)
    });
}

/// The most recently active visitors, at most `RECENT_VISITORS`
pub fn recent_visitors(mut visitors: Vec<Visitor>) -> Vec<Visitor> {
    sort_by_recent(&mut visitors);
    visitors.truncate(RECENT_VISITORS);
    visitors
}

fn rank<I>(labels: I, limit: usize) -> ChartSeries
where
    I: IntoIterator<Item = String>,
{
    // Insertion-ordered counts so the stable sort keeps first-seen order on ties
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<(String, u64)> = Vec::new();

    for label in labels {
        match index.get(&label) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(label.clone(), counts.len());
                counts.push((label, 1));
            }
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(limit);

    let (labels, values) = counts.into_iter().unzip();
    ChartSeries { labels, values }
}
