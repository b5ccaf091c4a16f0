//! Server-Sent Events (SSE) utilities
//!
//! Streams [`EngineEvent`]s from an [`EventBus`] to HTTP clients.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::events::EventBus;

/// Create an SSE stream forwarding every event emitted on `bus`
///
/// Sends a `ConnectionStatus` event first, then one SSE event per engine
/// event (event name = variant, data = JSON). Lagging clients skip the
/// events they missed and keep streaming.
pub fn create_event_sse_stream(
    service_name: &'static str,
    bus: &EventBus,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} events", service_name);
    let mut rx = bus.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let name = event.event_type();
                    match serde_json::to_string(&event) {
                        Ok(json) => yield Ok(Event::default().event(name).data(json)),
                        Err(e) => warn!(error = %e, event = name, "SSE: failed to serialize event"),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "SSE: client lagged, skipping events");
                }
                Err(RecvError::Closed) => {
                    info!("SSE: {} event bus closed", service_name);
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
