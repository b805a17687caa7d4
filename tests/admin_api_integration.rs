//! Integration tests for the authenticated admin API
//!
//! The store is seeded directly and the router is built with tracking off,
//! so admin calls themselves never show up in the data under test.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use visitrack::analytics::{FactExtractor, GeoLocation, VisitFact};
use visitrack::api::{create_router, AppState};
use visitrack::auth::AuthService;
use visitrack::config::{AdminCredentials, FrontendConfig, TrackingConfig};
use visitrack::live::LiveBroadcaster;
use visitrack::storage::{SqliteVisitStore, VisitStore};
use visitrack::tracking::Tracker;

const TTL: Duration = Duration::from_secs(3_600);

/// Helper to create test storage
async fn create_test_store() -> Arc<dyn VisitStore> {
    let store = SqliteVisitStore::new("sqlite::memory:", 1).await.unwrap();
    store.init().await.unwrap();
    Arc::new(store)
}

fn create_test_app(store: Arc<dyn VisitStore>) -> Router {
    let live = Arc::new(LiveBroadcaster::new());
    let tracking = TrackingConfig {
        enabled: false,
        ..TrackingConfig::default()
    };
    let tracker = Arc::new(Tracker::new(
        FactExtractor::basic(tracking),
        Arc::clone(&store),
        Arc::clone(&live),
    ));
    let state = Arc::new(AppState::new(store, live));
    let auth = Arc::new(AuthService::new(AdminCredentials {
        username: "admin".to_string(),
        password: "secret".to_string(),
    }));
    let frontend = FrontendConfig {
        public_dir: "tests/fixtures/public".to_string(),
        admin_dir: "tests/fixtures/admin".to_string(),
    };

    create_router(state, auth, tracker, &frontend)
}

fn fact(ip: &str, device: &str, path: &str, at: DateTime<Utc>) -> VisitFact {
    VisitFact {
        ip: ip.to_string(),
        device: device.to_string(),
        os: "Unknown".to_string(),
        browser: "Unknown".to_string(),
        is_mobile: device == "iPhone" || device == "Android",
        geo: None,
        path: path.to_string(),
        referrer: "Direct".to_string(),
        timestamp: at,
    }
}

fn admin_get(uri: &str) -> Request<Body> {
    let credentials = STANDARD.encode("admin:secret");
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Basic {credentials}"))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_admin_routes_require_basic_auth() {
    let app = create_test_app(create_test_store().await);

    for uri in ["/admin/api/stats", "/admin/api/export", "/admin/index.html", "/admin/live"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            r#"Basic realm="Admin Dashboard""#
        );
    }

    let wrong = STANDARD.encode("admin:nope");
    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/api/stats")
                .header(header::AUTHORIZATION, format!("Basic {wrong}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_is_public() {
    let app = create_test_app(create_test_store().await);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "OK");
}

#[tokio::test]
async fn test_stats() {
    let store = create_test_store().await;
    let now = Utc::now();
    store.record(&fact("1.2.3.4", "iPhone", "/", now), TTL).await;
    store.record(&fact("1.2.3.4", "iPhone", "/a", now), TTL).await;
    store.record(&fact("5.6.7.8", "Unknown", "/", now), TTL).await;

    let response = create_test_app(store)
        .oneshot(admin_get("/admin/api/stats"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["totalVisits"], 3);
    assert_eq!(json["uniqueVisitors"], 2);
    assert_eq!(json["mobileVisits"], 2);
    assert_eq!(json["status"], "success");
}

#[tokio::test]
async fn test_visitor_history_is_ascending() {
    let store = create_test_store().await;
    let now = Utc::now();
    store
        .record(&fact("1.2.3.4", "iPhone", "/second", now - TimeDelta::minutes(1)), TTL)
        .await;
    store
        .record(&fact("1.2.3.4", "iPhone", "/first", now - TimeDelta::minutes(5)), TTL)
        .await;

    let response = create_test_app(store)
        .oneshot(admin_get("/admin/api/visitors/1.2.3.4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["ip"], "1.2.3.4");
    let paths: Vec<&str> = json["visits"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["path"].as_str().unwrap())
        .collect();
    assert_eq!(paths, vec!["/first", "/second"]);
}

#[tokio::test]
async fn test_unknown_visitor_has_empty_history() {
    let app = create_test_app(create_test_store().await);

    let response = app
        .oneshot(admin_get("/admin/api/visitors/10.0.0.1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["visits"], serde_json::json!([]));
}

#[tokio::test]
async fn test_visitors_range_filter() {
    let store = create_test_store().await;
    let now = Utc::now();
    store
        .record(&fact("1.1.1.1", "Unknown", "/", now - TimeDelta::hours(48)), TTL)
        .await;
    store
        .record(&fact("2.2.2.2", "Unknown", "/", now - TimeDelta::hours(1)), TTL)
        .await;
    let app = create_test_app(store);

    let json = json_body(app.clone().oneshot(admin_get("/admin/api/visitors?range=24h")).await.unwrap()).await;
    let ips: Vec<&str> = json["visitors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["ip"].as_str().unwrap())
        .collect();
    assert_eq!(ips, vec!["2.2.2.2"]);

    // Default window is 7d, which holds both; newest first
    let json = json_body(app.oneshot(admin_get("/admin/api/visitors")).await.unwrap()).await;
    let ips: Vec<&str> = json["visitors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["ip"].as_str().unwrap())
        .collect();
    assert_eq!(ips, vec!["2.2.2.2", "1.1.1.1"]);
}

#[tokio::test]
async fn test_unknown_range_is_rejected() {
    let app = create_test_app(create_test_store().await);

    for uri in ["/admin/api/visitors?range=1y", "/admin/api/charts?range=yesterday"] {
        let response = app.clone().oneshot(admin_get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");

        let json = json_body(response).await;
        assert_eq!(json["status"], "error");
        assert!(json["error"].as_str().unwrap().contains("unknown range"));
    }
}

#[tokio::test]
async fn test_charts_rank_devices() {
    let store = create_test_store().await;
    let now = Utc::now();
    for (i, device) in ["iPhone", "Android", "iPhone", "iPhone"].iter().enumerate() {
        let at = now - TimeDelta::minutes(10 - i as i64);
        store.record(&fact(&format!("10.0.0.{i}"), device, "/", at), TTL).await;
    }

    let response = create_test_app(store)
        .oneshot(admin_get("/admin/api/charts?range=24h"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["devices"]["labels"], serde_json::json!(["iPhone", "Android"]));
    assert_eq!(json["devices"]["values"], serde_json::json!([3, 1]));
    assert_eq!(json["locations"]["labels"], serde_json::json!(["Unknown"]));
    assert_eq!(json["locations"]["values"], serde_json::json!([4]));
    assert_eq!(json["paths"]["values"], serde_json::json!([4]));
    assert_eq!(json["recentVisitors"][0]["ip"], "10.0.0.3");
    assert_eq!(json["range"], "24h");
}

#[tokio::test]
async fn test_export_csv() {
    let store = create_test_store().await;
    let mut visit = fact("1.2.3.4", "iPhone", "/pricing", Utc::now());
    visit.geo = Some(GeoLocation {
        country: Some("US".to_string()),
        region: None,
        city: Some("Austin".to_string()),
        coordinates: None,
    });
    store.record(&visit, TTL).await;

    let response = create_test_app(store)
        .oneshot(admin_get("/admin/api/export"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");

    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    let expected = format!(
        "attachment; filename=visitors-{}.csv",
        Utc::now().format("%Y-%m-%d")
    );
    assert_eq!(disposition, expected);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let mut reader = csv::Reader::from_reader(body.as_ref());
    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][0], "1.2.3.4");
    assert_eq!(&rows[0][5], "Austin, US");
    assert_eq!(&rows[0][6], "/pricing");
    assert_eq!(&rows[0][8], "Yes");
}

#[tokio::test]
async fn test_export_without_visits_has_header() {
    let response = create_test_app(create_test_store().await)
        .oneshot(admin_get("/admin/api/export"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert_eq!(
        text.trim_end(),
        r#""IP","Timestamp","Device","OS","Browser","Location","Path","Referrer","Is Mobile""#
    );
}

#[tokio::test]
async fn test_performance() {
    let response = create_test_app(create_test_store().await)
        .oneshot(admin_get("/admin/api/performance"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["avgLoadTime"], 0);
    assert!(json["memoryUsage"].as_u64().unwrap() > 0);
    assert!(json["uptime"].is_u64());
    assert!(json["cpuUsage"].is_number());
    assert_eq!(json["status"], "success");
}
