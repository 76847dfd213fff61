//! Per-client-IP rate limiting.

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::AppState;
use crate::error::AppError;

/// Client IP: first `X-Forwarded-For` entry, then `X-Real-IP`, then the
/// socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok())
        && let Some(first) = xff.split(',').next()
        && let Ok(ip) = first.trim().parse::<IpAddr>()
    {
        return Some(ip);
    }
    if let Some(real) = headers.get("x-real-ip").and_then(|v| v.to_str().ok())
        && let Ok(ip) = real.trim().parse::<IpAddr>()
    {
        return Some(ip);
    }
    peer
}

/// Axum middleware: 429 with `Retry-After` once the caller's bucket is empty.
pub async fn limit_by_ip(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.rate_limiter.is_enabled() {
        return Ok(next.run(request).await);
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let key = client_ip(request.headers(), peer)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".into());

    if !state.rate_limiter.allow(&key) {
        let retry_after_secs = state.rate_limiter.retry_after_secs();
        warn!(client_ip = %key, path = %request.uri().path(), "rate limit exceeded");
        return Err(AppError::RateLimited { retry_after_secs });
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("192.168.1.1, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("172.16.0.1"));
        assert_eq!(
            client_ip(&headers, None),
            Some("192.168.1.1".parse().unwrap())
        );
    }

    #[test]
    fn falls_back_to_real_ip_then_peer() {
        let mut headers = HeaderMap::new();
        let peer: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)), Some(peer));

        headers.insert("x-real-ip", HeaderValue::from_static("172.16.0.1"));
        assert_eq!(
            client_ip(&headers, Some(peer)),
            Some("172.16.0.1".parse().unwrap())
        );
    }
}
