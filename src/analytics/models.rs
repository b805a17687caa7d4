//! Data models for visitor analytics

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const UNKNOWN: &str = "Unknown";
pub const DIRECT_REFERRER: &str = "Direct";
pub const ROOT_PATH: &str = "/";

/// Geographic location information derived from the client IP
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoLocation {
    /// ISO country code (e.g., "US", "GB")
    pub country: Option<String>,

    /// Region/state/province
    pub region: Option<String>,

    /// City name
    pub city: Option<String>,

    /// Latitude and longitude
    #[serde(rename = "ll", alias = "coordinates", default)]
    pub coordinates: Option<[f64; 2]>,
}

impl GeoLocation {
    pub fn is_empty(&self) -> bool {
        self.country.is_none() && self.region.is_none() && self.city.is_none()
    }
}

/// One tracked request
///
/// The timestamp doubles as the ordering score of the visitor timeline, in
/// epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitFact {
    pub ip: String,

    #[serde(default = "unknown_label", deserialize_with = "unknown_if_missing")]
    pub device: String,

    #[serde(default = "unknown_label", deserialize_with = "unknown_if_missing")]
    pub os: String,

    #[serde(default = "unknown_label", deserialize_with = "unknown_if_missing")]
    pub browser: String,

    #[serde(default, deserialize_with = "false_if_null")]
    pub is_mobile: bool,

    #[serde(default)]
    pub geo: Option<GeoLocation>,

    #[serde(default = "root_path", deserialize_with = "root_if_missing")]
    pub path: String,

    #[serde(default = "direct_referrer", deserialize_with = "direct_if_missing")]
    pub referrer: String,

    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
}

impl VisitFact {
    /// Store score for this visit
    pub fn score(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    /// Location label as `"city, country"`, city, country or "Unknown"
    pub fn location_label(&self) -> String {
        let Some(geo) = &self.geo else {
            return UNKNOWN.to_string();
        };

        match (non_empty(geo.city.as_deref()), non_empty(geo.country.as_deref())) {
            (Some(city), Some(country)) => format!("{city}, {country}"),
            (Some(city), None) => city.to_string(),
            (None, Some(country)) => country.to_string(),
            (None, None) => UNKNOWN.to_string(),
        }
    }

    pub fn device_label(&self) -> &str {
        non_empty(Some(self.device.as_str())).unwrap_or(UNKNOWN)
    }

    pub fn os_label(&self) -> &str {
        non_empty(Some(self.os.as_str())).unwrap_or(UNKNOWN)
    }

    pub fn browser_label(&self) -> &str {
        non_empty(Some(self.browser.as_str())).unwrap_or(UNKNOWN)
    }

    pub fn path_label(&self) -> &str {
        non_empty(Some(self.path.as_str())).unwrap_or(ROOT_PATH)
    }

    pub fn referrer_label(&self) -> &str {
        non_empty(Some(self.referrer.as_str())).unwrap_or(DIRECT_REFERRER)
    }
}

/// All visits of one identity, ascending by timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visitor {
    pub ip: String,
    pub visits: Vec<VisitFact>,
}

impl Visitor {
    pub fn first_visit(&self) -> Option<&VisitFact> {
        self.visits.first()
    }

    pub fn last_visit(&self) -> Option<&VisitFact> {
        self.visits.last()
    }
}

/// Process-wide visit counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateCounters {
    pub total_visits: u64,
    pub mobile_visits: u64,
}

/// Index-aligned labels and counts for one chart
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub values: Vec<u64>,
}

impl ChartSeries {
    pub fn total(&self) -> u64 {
        self.values.iter().sum()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

fn unknown_label() -> String {
    UNKNOWN.to_string()
}

fn root_path() -> String {
    ROOT_PATH.to_string()
}

fn direct_referrer() -> String {
    DIRECT_REFERRER.to_string()
}

// Records written by other producers may carry `null` or `""` for a field;
// both read as missing.
fn string_or<'de, D>(deserializer: D, fallback: &str) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| fallback.to_string()))
}

fn unknown_if_missing<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    string_or(deserializer, UNKNOWN)
}

fn root_if_missing<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    string_or(deserializer, ROOT_PATH)
}

fn direct_if_missing<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    string_or(deserializer, DIRECT_REFERRER)
}

fn false_if_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or_default())
}

/// ISO-8601 with millisecond precision, e.g. `2024-05-01T12:30:00.250Z`
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Render a timestamp the way it is stored
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
