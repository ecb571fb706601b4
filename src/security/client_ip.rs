//! Best-effort client IP resolution.
//!
//! Order: `X-Real-IP`, then the first `X-Forwarded-For` hop, then the TCP
//! peer. Header values are not verified; the result is reflected as-is.

use std::net::SocketAddr;

use axum::http::HeaderMap;

const X_REAL_IP: &str = "x-real-ip";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Resolve the caller's IP. Returns an empty string when nothing is known.
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(ip) = header_str(headers, X_REAL_IP) {
        return ip.to_string();
    }

    if let Some(ip) = header_str(headers, X_FORWARDED_FOR)
        .and_then(|v| v.split(',').map(str::trim).find(|hop| !hop.is_empty()))
    {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
