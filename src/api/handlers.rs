use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use super::error::{ApiError, ApiResult};
use crate::analytics::{
    export_csv, load_all_visitors, load_visitors, ChartSeries, DashboardCharts, TimeRange,
    VisitFact, Visitor,
};
use crate::live::LiveBroadcaster;
use crate::storage::VisitStore;

const SUCCESS: &str = "success";

pub struct AppState {
    pub store: Arc<dyn VisitStore>,
    pub live: Arc<LiveBroadcaster>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn VisitStore>, live: Arc<LiveBroadcaster>) -> Self {
        Self {
            store,
            live,
            started_at: Instant::now(),
        }
    }
}

#[derive(Deserialize)]
pub struct RangeQuery {
    pub range: Option<String>,
}

impl RangeQuery {
    fn time_range(&self) -> ApiResult<TimeRange> {
        match self.range.as_deref() {
            None => Ok(TimeRange::default()),
            Some(value) => Ok(value.parse()?),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_visits: u64,
    pub unique_visitors: usize,
    pub mobile_visits: u64,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct VisitorsResponse {
    pub visitors: Vec<Visitor>,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub ip: String,
    pub visits: Vec<VisitFact>,
    pub status: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceResponse {
    pub avg_load_time: u64,
    pub memory_usage: u64,
    pub uptime: u64,
    pub cpu_usage: f64,
    pub status: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartsResponse {
    pub devices: ChartSeries,
    pub locations: ChartSeries,
    pub paths: ChartSeries,
    pub recent_visitors: Vec<Visitor>,
    pub range: String,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Aggregate counters plus the number of live timelines
pub async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatsResponse>> {
    let counters = state.store.counters().await?;
    let unique_visitors = state.store.identities().await?.len();

    Ok(Json(StatsResponse {
        total_visits: counters.total_visits,
        unique_visitors,
        mobile_visits: counters.mobile_visits,
        status: SUCCESS,
    }))
}

/// Visitors active within `?range=`, most recent first
pub async fn list_visitors(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<VisitorsResponse>> {
    let range = query.time_range()?;
    let visitors = load_visitors(state.store.as_ref(), range, Utc::now()).await?;

    Ok(Json(VisitorsResponse {
        visitors,
        status: SUCCESS,
    }))
}

/// Full history of one visitor, oldest first
pub async fn get_visitor(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> ApiResult<Json<HistoryResponse>> {
    let visits = state.store.history(&ip).await?;

    Ok(Json(HistoryResponse {
        ip,
        visits,
        status: SUCCESS,
    }))
}

pub async fn get_performance(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<PerformanceResponse>> {
    let memory_usage = process_memory().map_err(ApiError::Internal)?;

    Ok(Json(PerformanceResponse {
        avg_load_time: 0,
        memory_usage,
        uptime: state.started_at.elapsed().as_secs(),
        cpu_usage: sysinfo::System::load_average().one,
        status: SUCCESS,
    }))
}

/// Resident memory of this process in bytes
fn process_memory() -> Result<u64, String> {
    let pid = sysinfo::get_current_pid().map_err(|e| e.to_string())?;
    let mut system = sysinfo::System::new();
    system.refresh_process(pid);

    system
        .process(pid)
        .map(|process| process.memory())
        .ok_or_else(|| "current process not found".to_string())
}

/// Every stored visit as a CSV download
pub async fn export_visitors(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let visitors = load_all_visitors(state.store.as_ref()).await?;
    let body = export_csv(&visitors)?;

    let disposition = format!(
        "attachment; filename=visitors-{}.csv",
        Utc::now().format("%Y-%m-%d")
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

/// Dashboard chart series for `?range=`
pub async fn get_charts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<ChartsResponse>> {
    let range = query.time_range()?;
    let visitors = load_visitors(state.store.as_ref(), range, Utc::now()).await?;
    let charts = DashboardCharts::build(&visitors);

    Ok(Json(ChartsResponse {
        devices: charts.devices,
        locations: charts.locations,
        paths: charts.paths,
        recent_visitors: charts.recent_visitors,
        range: range.to_string(),
        status: SUCCESS,
    }))
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "OK" })
}
