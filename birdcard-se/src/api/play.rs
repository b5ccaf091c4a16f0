//! Play event endpoint
//!
//! A device reports that a play happened; the engine makes sure today's card
//! for the observer's location is selected and published exactly once.

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use birdcard_common::{DayKey, Item, Location, LocationBucket, SelectionTier};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{info, warn};

use super::observer_address;
use crate::error::{ApiError, ApiResult, EngineError};
use crate::services::{PlayOutcome, PlayRequest, PlayStatus};
use crate::AppState;

const PLAY_EVENT_TYPE: &str = "play";

#[derive(Debug, Deserialize)]
pub struct PlayEvent {
    pub event_type: String,
    /// Defaults to the configured target
    pub target_id: Option<String>,
    pub device_id: Option<String>,
    /// IP or IP:port; overrides forwarded/peer addresses
    pub observer_address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    AlreadyUpdated,
    Error,
}

impl From<PlayStatus> for ResponseStatus {
    fn from(status: PlayStatus) -> Self {
        match status {
            PlayStatus::Success => ResponseStatus::Success,
            PlayStatus::AlreadyUpdated => ResponseStatus::AlreadyUpdated,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlayErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<SelectionTier>,
}

#[derive(Debug, Serialize)]
pub struct PlayResponse {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<Item>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_key: Option<DayKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<LocationBucket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<SelectionTier>,
    pub spotted_nearby: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PlayErrorBody>,
}

impl From<PlayOutcome> for PlayResponse {
    fn from(outcome: PlayOutcome) -> Self {
        Self {
            status: outcome.status.into(),
            item_id: Some(outcome.record.item.id.clone()),
            item: Some(outcome.record.item.clone()),
            location: outcome.resolution.location.location().cloned(),
            confidence: outcome.resolution.confidence,
            day_key: Some(outcome.day_key),
            bucket: Some(outcome.bucket),
            tier: Some(outcome.record.tier),
            spotted_nearby: outcome.spotted_nearby,
            error: None,
        }
    }
}

impl From<&EngineError> for PlayResponse {
    fn from(err: &EngineError) -> Self {
        let (day_key, bucket) = match err {
            EngineError::NothingPublished {
                day_key, bucket, ..
            } => (Some(*day_key), Some(bucket.clone())),
            EngineError::SelectionExhausted { day_key, .. } => (Some(*day_key), None),
            _ => (None, None),
        };
        Self {
            status: ResponseStatus::Error,
            item_id: None,
            item: None,
            location: None,
            confidence: 0.0,
            day_key,
            bucket,
            tier: err.tier(),
            spotted_nearby: false,
            error: Some(PlayErrorBody {
                code: err.code().to_string(),
                message: err.to_string(),
                tier: err.tier(),
            }),
        }
    }
}

/// POST /api/play
pub async fn play(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(event): Json<PlayEvent>,
) -> ApiResult<(StatusCode, Json<PlayResponse>)> {
    if event.event_type != PLAY_EVENT_TYPE {
        return Err(ApiError::BadRequest(format!(
            "unsupported event_type: {}",
            event.event_type
        )));
    }

    let request = PlayRequest {
        target_id: event
            .target_id
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| state.default_target_id.clone()),
        device_id: event.device_id,
        address: observer_address(
            event.observer_address.as_deref(),
            &headers,
            connect.map(|ConnectInfo(addr)| addr),
        ),
    };

    match state.engine.handle_play(&request).await {
        Ok(outcome) => {
            info!(
                target_id = %request.target_id,
                item_id = %outcome.record.item.id,
                status = ?outcome.status,
                bucket = %outcome.bucket,
                "Play handled"
            );
            Ok((StatusCode::OK, Json(outcome.into())))
        }
        Err(e) => {
            warn!(target_id = %request.target_id, error = %e, "Play failed");
            Ok((e.status_code(), Json(PlayResponse::from(&e))))
        }
    }
}

pub fn play_routes() -> Router<AppState> {
    Router::new().route("/api/play", post(play))
}
