//! birdcard-se library interface
//!
//! Location-aware daily selection for shared cards: resolves where an
//! observer is, keys the day and area, and guarantees one published item per
//! key. Exposed as a library for the binary and integration tests.

pub mod api;
pub mod clients;
pub mod error;
pub mod services;
pub mod types;

pub use crate::error::{ApiError, ApiResult, EngineError};

use axum::Router;
use birdcard_common::events::EventBus;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::services::SelectionEngine;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SelectionEngine>,
    /// Event bus for SSE broadcasting
    pub events: EventBus,
    /// Target used when a request names none
    pub default_target_id: String,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Arc<SelectionEngine>, default_target_id: impl Into<String>) -> Self {
        Self {
            events: engine.events().clone(),
            engine,
            default_target_id: default_target_id.into(),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::play_routes())
        .merge(api::track_routes())
        .route("/api/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
