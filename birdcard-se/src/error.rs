//! Error types for birdcard-se
//!
//! [`EngineError`] is the engine's taxonomy. Soft variants are absorbed by the
//! next fallback tier and never reach a caller as failures; hard variants are
//! returned with the tier that failed. [`ApiError`] maps everything onto HTTP.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use birdcard_common::{DayKey, LocationBucket, SelectionTier};
use serde_json::json;
use thiserror::Error;

/// Engine error taxonomy
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// No location could be determined (soft: global tier takes over)
    #[error("Location unresolved")]
    LocationUnresolved,

    /// Selection source failed or had nothing (soft: next tier)
    #[error("External selection unavailable: {0}")]
    ExternalSelectionUnavailable(String),

    /// Shared target rejected the publish (hard: key left open for retry)
    #[error("Publish failed for target {target_id} (item {item_id}, {tier} tier): {reason}")]
    PublishFailed {
        target_id: String,
        item_id: String,
        tier: SelectionTier,
        reason: String,
    },

    /// Session outlived its TTL (soft: transparent rebind)
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Every configured tier failed (hard)
    #[error("No selection tier produced an item for target {target_id} on {day_key}")]
    SelectionExhausted { target_id: String, day_key: DayKey },

    /// Selection task ended without a result (hard)
    #[error("Selection interrupted: {0}")]
    SelectionInterrupted(String),

    /// Read path found no published record (hard for that fetch)
    #[error("Nothing published for target {target_id} on {day_key} in bucket {bucket}")]
    NothingPublished {
        target_id: String,
        day_key: DayKey,
        bucket: LocationBucket,
    },
}

impl EngineError {
    /// True for errors the next fallback tier absorbs
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            EngineError::LocationUnresolved
                | EngineError::ExternalSelectionUnavailable(_)
                | EngineError::SessionExpired(_)
        )
    }

    /// Tier that failed, when the error is tied to one
    pub fn tier(&self) -> Option<SelectionTier> {
        match self {
            EngineError::PublishFailed { tier, .. } => Some(*tier),
            _ => None,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::LocationUnresolved => "LOCATION_UNRESOLVED",
            EngineError::ExternalSelectionUnavailable(_) => "EXTERNAL_SELECTION_UNAVAILABLE",
            EngineError::PublishFailed { .. } => "PUBLISH_FAILED",
            EngineError::SessionExpired(_) => "SESSION_EXPIRED",
            EngineError::SelectionExhausted { .. } => "SELECTION_EXHAUSTED",
            EngineError::SelectionInterrupted(_) => "SELECTION_INTERRUPTED",
            EngineError::NothingPublished { .. } => "NOTHING_PUBLISHED",
        }
    }

    /// HTTP status used when the error reaches a client
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::PublishFailed { .. } => StatusCode::BAD_GATEWAY,
            EngineError::SelectionExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::NothingPublished { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Engine failure, status derived from the variant
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// birdcard-common error
    #[error("Common error: {0}")]
    Common(#[from] birdcard_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Engine(ref err) => (err.status_code(), err.code(), err.to_string()),
            ApiError::Common(birdcard_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
