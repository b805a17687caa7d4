//! Client IP extraction from HTTP headers with trust validation
//!
//! This module implements client IP extraction that:
//! - Validates trust chains for X-Forwarded-For and Forwarded headers
//! - Supports vendor-specific headers (e.g., CF-Connecting-IP)
//! - Falls back to socket remote address when headers are untrusted
//! - Handles both IPv4 and IPv6
//!
//! It also turns the resolved address into the visitor identity key,
//! optionally anonymized.

use axum::http::HeaderMap;
use std::net::{IpAddr, Ipv6Addr};
use tracing::warn;

use crate::config::{TrackingConfig, TrustedProxyMode};

/// Identity used when neither the headers nor the socket yield an address
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Extract the client IP address from HTTP headers
///
/// # Arguments
/// * `headers` - HTTP request headers
/// * `socket_addr` - The socket remote address (fallback), if known
/// * `config` - Tracking configuration with trust settings
pub fn extract_client_ip(
    headers: &HeaderMap,
    socket_addr: Option<IpAddr>,
    config: &TrackingConfig,
) -> Option<IpAddr> {
    match config.trusted_proxy_mode {
        TrustedProxyMode::Cloudflare => extract_cloudflare_ip(headers).or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => extract_standard_ip(headers, config).or(socket_addr),
        TrustedProxyMode::None => socket_addr,
    }
}

/// Turn a resolved client address into the identity key, anonymized when configured
pub fn client_identity(ip: Option<IpAddr>, anonymize: bool) -> String {
    let identity = ip
        .map(|ip| ip.to_canonical().to_string())
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string());

    if anonymize {
        anonymize_identity(&identity)
    } else {
        identity
    }
}

/// Extract IP from Cloudflare-specific header
fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// Extract IP from standard headers (Forwarded, X-Forwarded-For) with trust validation
fn extract_standard_ip(headers: &HeaderMap, config: &TrackingConfig) -> Option<IpAddr> {
    // Prefer RFC 7239 Forwarded header
    if let Some(ip) = extract_from_forwarded(headers, config) {
        return Some(ip);
    }

    extract_from_x_forwarded_for(headers, config)
}

/// Parse RFC 7239 Forwarded header into its `for=` chain
fn extract_from_forwarded(headers: &HeaderMap, config: &TrackingConfig) -> Option<IpAddr> {
    let forwarded = headers.get("forwarded")?.to_str().ok()?;

    // Forwarded: for=192.0.2.60;proto=http;by=203.0.113.43, for="[2001:db8::1]:4711"
    let chain: Vec<IpAddr> = forwarded
        .split(',')
        .filter_map(|element| {
            element.split(';').find_map(|param| {
                let param = param.trim();
                let value = param
                    .strip_prefix("for=")
                    .or_else(|| param.strip_prefix("For="))?;
                parse_forwarded_node(value.trim_matches('"'))
            })
        })
        .collect();

    select_from_chain(&chain, config)
}

fn parse_forwarded_node(node: &str) -> Option<IpAddr> {
    if let Some(rest) = node.strip_prefix('[') {
        // Bracketed IPv6, optionally followed by a port
        return rest.split(']').next()?.parse::<IpAddr>().ok();
    }

    node.parse::<IpAddr>()
        .ok()
        .or_else(|| node.split(':').next()?.parse::<IpAddr>().ok())
}

/// Parse X-Forwarded-For header with right-to-left trust validation
fn extract_from_x_forwarded_for(headers: &HeaderMap, config: &TrackingConfig) -> Option<IpAddr> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;

    let chain: Vec<IpAddr> = xff
        .split(',')
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect();

    select_from_chain(&chain, config)
}

/// Pick the client address from a proxy chain (leftmost = original client)
fn select_from_chain(ips: &[IpAddr], config: &TrackingConfig) -> Option<IpAddr> {
    if ips.is_empty() {
        return None;
    }

    // If num_trusted_proxies is specified, skip that many from the right
    if let Some(num_trusted) = config.num_trusted_proxies {
        if ips.len() > num_trusted {
            return Some(ips[ips.len() - num_trusted - 1]);
        }
        // Not enough IPs in chain, return the leftmost (least trusted)
        return ips.first().copied();
    }

    // Walk right to left and stop at the first hop outside the trusted networks
    if !config.trusted_proxies.is_empty() {
        return ips
            .iter()
            .rev()
            .find(|ip| !config.trusted_proxies.iter().any(|net| net.contains(*ip)))
            .or_else(|| ips.first())
            .copied();
    }

    // No trust configuration, return the rightmost IP
    ips.last().copied()
}

/// Anonymize an IP address by truncating to network prefix
///
/// - IPv4: Truncate to /16 (zero last two octets)
/// - IPv6: Truncate to /48 (zero last 80 bits)
pub fn anonymize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(addr) => {
            let octets = addr.octets();
            IpAddr::V4(std::net::Ipv4Addr::new(octets[0], octets[1], 0, 0))
        }
        IpAddr::V6(addr) => {
            let segments = addr.segments();
            // Keep first 3 segments (48 bits), zero the rest
            IpAddr::V6(Ipv6Addr::new(
                segments[0],
                segments[1],
                segments[2],
                0,
                0,
                0,
                0,
                0,
            ))
        }
    }
}

/// Anonymize an identity key
///
/// Dotted identities keep their first two segments and get `.x.x` appended
/// (`203.0.113.7` becomes `203.0.x.x`). IPv6 identities are truncated to /48.
/// Anything with fewer than two dot segments that is not IPv6 is returned
/// unchanged. Applying this twice yields the same result as once.
pub fn anonymize_identity(identity: &str) -> String {
    if let Ok(addr) = identity.parse::<Ipv6Addr>() {
        return anonymize_ip(IpAddr::V6(addr)).to_string();
    }

    let mut segments = identity.split('.');
    match (segments.next(), segments.next()) {
        (Some(first), Some(second)) => format!("{first}.{second}.x.x"),
        _ => identity.to_string(),
    }
}
