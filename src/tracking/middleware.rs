use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;

use super::Tracker;
use crate::analytics::user_agent::is_mobile_agent;
use crate::analytics::models::UNKNOWN;

const VIEWPORT_HINT: &str = "width=device-width, initial-scale=1.0";

/// Record exactly one visit per request when tracking is enabled
pub async fn track_visit(
    State(tracker): State<Arc<Tracker>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if tracker.is_enabled() {
        let socket_ip = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let fact = tracker.extract(request.headers(), socket_ip, request.uri().path());
        tracker.spawn_persist(fact);
    }

    next.run(request).await
}

/// Ask HTML pages served to mobile agents to use the device viewport
pub async fn mobile_viewport_hint(request: Request<Body>, next: Next) -> Response {
    let is_mobile = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|ua| is_mobile_agent(UNKNOWN, ua));

    let mut response = next.run(request).await;

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/html"));

    if is_mobile && is_html {
        response
            .headers_mut()
            .insert("x-viewport-meta", HeaderValue::from_static(VIEWPORT_HINT));
    }

    response
}
