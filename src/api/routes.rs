use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderValue},
    middleware::{self, Next},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::auth::{auth_middleware, AuthService};
use crate::config::FrontendConfig;
use crate::tracking::{mobile_viewport_hint, track_visit, Tracker};

use super::handlers::{
    export_visitors, get_charts, get_performance, get_stats, get_visitor, health_check,
    list_visitors, AppState,
};
use super::live::live_socket;

/// Build the complete application router
///
/// Every request passes through visit tracking; `/admin` and everything under
/// it additionally requires Basic auth.
pub fn create_router(
    state: Arc<AppState>,
    auth_service: Arc<AuthService>,
    tracker: Arc<Tracker>,
    frontend: &FrontendConfig,
) -> Router {
    let admin_routes = Router::new()
        .route("/api/stats", get(get_stats))
        .route("/api/visitors", get(list_visitors))
        .route("/api/visitors/{ip}", get(get_visitor))
        .route("/api/performance", get(get_performance))
        .route("/api/export", get(export_visitors))
        .route("/api/charts", get(get_charts))
        .route("/live", get(live_socket))
        .fallback_service(ServeDir::new(&frontend.admin_dir))
        .layer(middleware::from_fn(move |headers: HeaderMap, req: Request, next: Next| {
            let auth = Arc::clone(&auth_service);
            auth_middleware(auth, headers, req, next)
        }))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .nest("/admin", admin_routes)
        .fallback_service(ServeDir::new(&frontend.public_dir))
        .layer(middleware::from_fn(mobile_viewport_hint))
        .layer(middleware::from_fn_with_state(tracker, track_visit))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
}
