//! "Spotted nearby" check
//!
//! Answers whether the selected item has recent occurrence reports near the
//! observer. Purely informational: it never changes the selection and any
//! failure reads as "no".

use birdcard_common::ResolvedLocation;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::types::OccurrenceSource;

pub struct RegionalityChecker {
    source: Arc<dyn OccurrenceSource>,
    radius_km: f64,
    window_days: u32,
}

impl RegionalityChecker {
    pub fn new(source: Arc<dyn OccurrenceSource>, radius_km: f64, window_days: u32) -> Self {
        Self {
            source,
            radius_km,
            window_days,
        }
    }

    /// True when `item_id` was reported within the radius and window
    ///
    /// Unresolved or fallback locations answer false without a lookup.
    pub async fn check(&self, item_id: &str, resolved: &ResolvedLocation) -> bool {
        let Some(location) = resolved.location().filter(|l| l.is_bucketable()) else {
            return false;
        };

        match self
            .source
            .occurrences_near(item_id, location, self.radius_km, self.window_days)
            .await
        {
            Ok(count) => {
                debug!(item_id, count, location = %location.label(), "Regionality check");
                count > 0
            }
            Err(e) => {
                warn!(item_id, error = %e, "Regionality check failed, reporting not nearby");
                false
            }
        }
    }
}
