//! Client IP extraction for rate limiting. Prefers the first hop of
//! `X-Forwarded-For` (set by a trusted reverse proxy), falling back to the
//! socket's peer address.

use axum::extract::{ConnectInfo, Request};
use std::net::SocketAddr;

pub fn extract_client_ip(req: &Request) -> Option<String> {
    if let Some(forwarded) = req.headers().get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let ip = first.trim();
            if !ip.is_empty() {
                return Some(ip.to_string());
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}
