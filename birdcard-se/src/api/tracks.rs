//! Track fetch endpoint
//!
//! Redirects to the audio asset for one step of the playback sequence and
//! returns the session id to reuse for the remaining steps.

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use birdcard_common::TrackKind;
use serde::Deserialize;
use std::net::SocketAddr;
use tracing::debug;

use super::observer_address;
use crate::error::ApiResult;
use crate::services::TrackRequest;
use crate::AppState;

pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Debug, Default, Deserialize)]
pub struct TrackQuery {
    pub session: Option<String>,
    pub target: Option<String>,
    pub device_id: Option<String>,
}

/// GET /api/tracks/:kind
pub async fn fetch_track(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<TrackQuery>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let kind: TrackKind = kind.parse()?;

    let request = TrackRequest {
        session_id: query.session,
        kind,
        target_id: query
            .target
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| state.default_target_id.clone()),
        device_id: query.device_id,
        address: observer_address(None, &headers, connect.map(|ConnectInfo(addr)| addr)),
    };

    let track = state.engine.fetch_track(&request).await?;
    debug!(
        session_id = %track.session_id,
        item_id = %track.item.id,
        kind = %kind,
        rebound = track.rebound,
        "Track served"
    );

    Ok((
        [(SESSION_HEADER, track.session_id)],
        Redirect::temporary(&track.asset_url),
    )
        .into_response())
}

pub fn track_routes() -> Router<AppState> {
    Router::new().route("/api/tracks/:kind", get(fetch_track))
}
