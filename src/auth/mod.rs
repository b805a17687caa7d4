use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::config::AdminCredentials;

const CHALLENGE: &str = r#"Basic realm="Admin Dashboard""#;

/// HTTP Basic authentication for the admin surface
pub struct AuthService {
    credentials: AdminCredentials,
}

impl AuthService {
    pub fn new(credentials: AdminCredentials) -> Self {
        Self { credentials }
    }

    /// Check an `Authorization` header value
    pub fn validate_header(&self, value: &str) -> bool {
        let Some(encoded) = value.strip_prefix("Basic ") else {
            return false;
        };

        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };

        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };

        match decoded.split_once(':') {
            Some((user, password)) => self.validate(user, password),
            None => false,
        }
    }

    pub fn validate(&self, user: &str, password: &str) -> bool {
        let user_ok = user.as_bytes().ct_eq(self.credentials.username.as_bytes());
        let password_ok = password
            .as_bytes()
            .ct_eq(self.credentials.password.as_bytes());
        (user_ok & password_ok).into()
    }
}

pub async fn auth_middleware(
    auth_service: Arc<AuthService>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|value| auth_service.validate_header(value));

    if authorized {
        next.run(request).await
    } else {
        debug!(path = %request.uri().path(), "rejected admin request");
        unauthorized()
    }
}

fn unauthorized() -> Response {
    let mut response = (StatusCode::UNAUTHORIZED, "Authentication required").into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(CHALLENGE));
    response
}
