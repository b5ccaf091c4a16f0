//! Periodic maintenance tasks
//!
//! Each task is a tokio interval loop over a shared engine handle. Missed
//! ticks are skipped rather than bunched up after a stall.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::engine::SelectionEngine;

fn interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period.max(Duration::from_secs(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Sweep expired sessions every `period`
pub fn spawn_session_sweeper(engine: Arc<SelectionEngine>, period: Duration) -> JoinHandle<()> {
    info!(period_secs = period.as_secs(), "Session sweeper started");
    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            engine.sweep_sessions();
        }
    })
}

/// Evict superseded selection records every `period`
pub fn spawn_record_sweeper(engine: Arc<SelectionEngine>, period: Duration) -> JoinHandle<()> {
    info!(period_secs = period.as_secs(), "Selection record sweeper started");
    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            engine.sweep_records();
        }
    })
}

/// Keep the global record for `target_id` populated for the current UTC day
pub fn spawn_global_refresh(
    engine: Arc<SelectionEngine>,
    target_id: String,
    period: Duration,
) -> JoinHandle<()> {
    info!(target_id = %target_id, period_secs = period.as_secs(), "Global refresh scheduler started");
    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            match engine.refresh_global(&target_id).await {
                Ok(outcome) => info!(
                    target_id = %target_id,
                    day_key = %outcome.day_key,
                    item_id = %outcome.record.item.id,
                    status = ?outcome.status,
                    "Global record refreshed"
                ),
                Err(e) => warn!(target_id = %target_id, error = %e, "Global refresh failed"),
            }
        }
    })
}
