//! Client address extraction for per-client rate limiting

use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

/// Client IP from `X-Forwarded-For` (first valid entry), then `X-Real-IP`,
/// then the socket address. `"unknown"` when none is usable.
pub fn extract_client_ip(headers: &HeaderMap, socket_addr: Option<&SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|chain| {
            chain
                .split(',')
                .map(str::trim)
                .find(|ip| is_valid_ip(ip))
                .map(String::from)
        });
    if let Some(ip) = forwarded {
        return ip;
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let trimmed = real_ip.trim();
        if is_valid_ip(trimmed) {
            return trimmed.to_string();
        }
    }

    socket_addr
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn is_valid_ip(s: &str) -> bool {
    s.parse::<IpAddr>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_forwarded_for_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("garbage, 203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(extract_client_ip(&headers, None), "203.0.113.7");
    }

    #[test]
    fn test_falls_back_to_real_ip_then_socket() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static(" 198.51.100.2 "));
        assert_eq!(extract_client_ip(&headers, None), "198.51.100.2");

        let addr: SocketAddr = "192.0.2.1:5555".parse().unwrap();
        assert_eq!(extract_client_ip(&HeaderMap::new(), Some(&addr)), "192.0.2.1");
        assert_eq!(extract_client_ip(&HeaderMap::new(), None), "unknown");
    }
}
