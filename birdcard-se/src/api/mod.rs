//! HTTP API handlers for birdcard-se

pub mod health;
pub mod play;
pub mod sse;
pub mod tracks;

pub use health::health_routes;
pub use play::play_routes;
pub use sse::event_stream;
pub use tracks::track_routes;

use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

/// Observer address: explicit value, then first `X-Forwarded-For` hop, then
/// the socket peer
pub fn observer_address(
    explicit: Option<&str>,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> Option<IpAddr> {
    explicit
        .and_then(parse_address)
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(parse_address)
        })
        .or_else(|| peer.map(|p| p.ip()))
}

fn parse_address(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    raw.parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|s| s.ip()))
}
