//! Server-Sent Events for engine activity

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use birdcard_common::sse::create_event_sse_stream;
use futures::stream::Stream;
use std::convert::Infallible;

use crate::AppState;

/// GET /api/events
///
/// Streams ItemSelected, PublishFailed, SessionBound, SessionExpired,
/// DisplayRepublished and RecordsEvicted.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    create_event_sse_stream("birdcard-se", &state.events)
}
