//! Proxy header construction and hop-by-hop stripping.
//!
//! [`build_forwarded_headers`] starts from the client's headers, strips
//! hop-by-hop headers, and adds proxy metadata (`X-Forwarded-For`,
//! `X-Real-IP`, `X-Forwarded-Proto`, `X-Forwarded-Host`, `Via`,
//! `X-Correlation-Id`). The client's `Host` header is passed through so
//! that backends see the name they were addressed by.

use std::sync::LazyLock;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use super::CORRELATION_HEADER;

static HOP_BY_HOP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    [
        "connection",
        "keep-alive",
        "transfer-encoding",
        "te",
        "trailer",
        "upgrade",
        "proxy-authorization",
        "proxy-authenticate",
    ]
    .iter()
    .filter_map(|name| name.parse::<HeaderName>().ok())
    .collect()
});

pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named in `Connection` are hop-by-hop too.
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| name.trim().parse::<HeaderName>().ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}

/// Strip hop-by-hop headers and `content-length` from an upstream response.
///
/// The body has already been collected, so the origin's framing headers
/// no longer apply; axum sets `content-length` from the actual bytes.
pub fn strip_response_hop_by_hop(headers: &mut HeaderMap) {
    strip_hop_by_hop(headers);
    headers.remove(header::CONTENT_LENGTH);
}

pub fn build_forwarded_headers(
    original: &HeaderMap,
    client_ip: &str,
    scheme: &str,
    correlation_id: &str,
) -> HeaderMap {
    let mut headers = original.clone();
    strip_hop_by_hop(&mut headers);

    // X-Forwarded-For: append to chain
    let xff = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map_or_else(
            || client_ip.to_string(),
            |existing| format!("{existing}, {client_ip}"),
        );
    if let Ok(val) = HeaderValue::from_str(&xff) {
        headers.insert("x-forwarded-for", val);
    }

    // X-Real-IP (first IP in chain)
    let real_ip = xff.split(',').next().unwrap_or(client_ip).trim();
    if let Ok(val) = HeaderValue::from_str(real_ip) {
        headers.insert("x-real-ip", val);
    }

    if let Ok(val) = HeaderValue::from_str(scheme) {
        headers.insert("x-forwarded-proto", val);
    }

    if let Some(original_host) = original.get(header::HOST) {
        headers.insert("x-forwarded-host", original_host.clone());
    }

    headers.insert(header::VIA, HeaderValue::from_static("1.1 portico"));

    if let Ok(val) = HeaderValue::from_str(correlation_id) {
        headers.insert(CORRELATION_HEADER, val);
    }

    headers
}
