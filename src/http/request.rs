//! Request metadata extraction.
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing (`SetRequestIdLayer`)
//! - Forwarding headers are ignored unless the deployment says a trusted
//!   proxy overwrites them; otherwise any sender could pick its own rate
//!   limit key

use std::net::SocketAddr;

use axum::http::HeaderMap;

pub const X_REQUEST_ID: &str = "x-request-id";

/// The address the rate limiter keys on.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            // "client, proxy1, proxy2": leftmost is the original client
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
            });
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    peer.ip().to_string()
}

pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}
