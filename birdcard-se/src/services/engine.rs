//! Selection engine
//!
//! One state machine for every entry point:
//! resolve location → day key + bucket → per-key cache → fallback tiers →
//! publish → record. [`SelectionPolicy`] decides the tier order and whether
//! unresolved observers may trigger a selection at all.

use birdcard_common::config::{EngineConfig, SelectionConfig};
use birdcard_common::events::{EngineEvent, EventBus};
use birdcard_common::time::secs_to_duration;
use birdcard_common::{Clock, DayKey, Item, Location, LocationBucket, SelectionTier};
use chrono::Datelike;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::bucketer::LocationBucketer;
use super::day_key::DayKeyCalculator;
use super::location_resolver::{LocationResolver, Resolution};
use super::regionality::RegionalityChecker;
use super::selection_cache::{CacheOutcome, SelectionCache, SelectionKey, SelectionRecord};
use super::session_store::SessionStore;
use super::target_ledger::TargetLedger;
use crate::error::EngineError;
use crate::types::{
    Anchor, DeviceRegistry, IpGeolocator, OccurrenceSource, PublishMetadata, PublishScope,
    Publisher, SelectionSource, TimezoneLookup,
};

/// Tier order and unresolved-observer handling
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionPolicy {
    pub fallback_order: Vec<SelectionTier>,
    /// Unresolved observers only read the global record, never select it
    pub bypass_cache_for_unresolved: bool,
}

impl SelectionPolicy {
    pub fn from_config(config: &SelectionConfig) -> Self {
        Self {
            fallback_order: config.fallback_order.clone(),
            bypass_cache_for_unresolved: config.bypass_cache_for_unresolved,
        }
    }
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self::from_config(&SelectionConfig::default())
    }
}

/// External services the engine depends on
#[derive(Clone)]
pub struct Collaborators {
    pub ip_geo: Arc<dyn IpGeolocator>,
    pub device_registry: Option<Arc<dyn DeviceRegistry>>,
    pub timezone_lookup: Option<Arc<dyn TimezoneLookup>>,
    pub selection_source: Arc<dyn SelectionSource>,
    pub publisher: Arc<dyn Publisher>,
    pub occurrences: Arc<dyn OccurrenceSource>,
}

/// Inbound play event, already validated
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub target_id: String,
    pub device_id: Option<String>,
    pub address: Option<IpAddr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayStatus {
    /// This call selected and published the item
    Success,
    /// The item for this key was already published
    AlreadyUpdated,
}

#[derive(Debug, Clone)]
pub struct PlayOutcome {
    pub status: PlayStatus,
    pub record: Arc<SelectionRecord>,
    pub resolution: Resolution,
    pub day_key: DayKey,
    pub bucket: LocationBucket,
    pub spotted_nearby: bool,
}

/// Where a play's key landed
pub(super) struct KeyedObserver {
    pub key: SelectionKey,
    pub unresolved: bool,
}

pub struct SelectionEngine {
    pub(super) resolver: LocationResolver,
    pub(super) day_keys: DayKeyCalculator,
    pub(super) bucketer: LocationBucketer,
    pub(super) cache: SelectionCache,
    pub(super) sessions: SessionStore,
    pub(super) ledger: TargetLedger,
    regionality: RegionalityChecker,
    selection_source: Arc<dyn SelectionSource>,
    pub(super) publisher: Arc<dyn Publisher>,
    anchors: Vec<Anchor>,
    policy: SelectionPolicy,
    pub(super) asset_base_url: String,
    retain_days: u32,
    pub(super) events: EventBus,
    pub(super) clock: Arc<dyn Clock>,
}

impl SelectionEngine {
    pub fn new(
        config: &EngineConfig,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        let anchors = config.selection.anchors.iter().map(Anchor::from).collect();
        Self {
            resolver: LocationResolver::new(
                collaborators.ip_geo,
                collaborators.device_registry,
                config.location.sentinels.clone(),
            ),
            day_keys: DayKeyCalculator::new(collaborators.timezone_lookup, clock.clone()),
            bucketer: LocationBucketer::new(config.location.bucket_decimals),
            cache: SelectionCache::new(),
            sessions: SessionStore::new(secs_to_duration(config.session.ttl_secs), clock.clone()),
            ledger: TargetLedger::new(),
            regionality: RegionalityChecker::new(
                collaborators.occurrences,
                config.regionality.radius_km,
                config.regionality.window_days,
            ),
            selection_source: collaborators.selection_source,
            publisher: collaborators.publisher,
            anchors,
            policy: SelectionPolicy::from_config(&config.selection),
            asset_base_url: config
                .collaborators
                .asset_base_url
                .trim_end_matches('/')
                .to_string(),
            retain_days: config.selection.retain_days,
            events,
            clock,
        }
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    pub fn cache(&self) -> &SelectionCache {
        &self.cache
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn ledger(&self) -> &TargetLedger {
        &self.ledger
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Handle a play event from a device
    pub async fn handle_play(
        self: &Arc<Self>,
        request: &PlayRequest,
    ) -> Result<PlayOutcome, EngineError> {
        let resolution = self
            .resolver
            .resolve(request.address, request.device_id.as_deref())
            .await;
        self.play_for(&request.target_id, resolution).await
    }

    /// Run the play state machine for an already resolved observer
    pub async fn play_for(
        self: &Arc<Self>,
        target_id: &str,
        resolution: Resolution,
    ) -> Result<PlayOutcome, EngineError> {
        self.run(target_id, resolution, self.policy.bypass_cache_for_unresolved)
            .await
    }

    /// Make sure the global record for today's UTC day exists
    ///
    /// Used by the scheduler; always allowed to select.
    pub async fn refresh_global(
        self: &Arc<Self>,
        target_id: &str,
    ) -> Result<PlayOutcome, EngineError> {
        self.run(target_id, Resolution::unresolved(), false).await
    }

    async fn run(
        self: &Arc<Self>,
        target_id: &str,
        resolution: Resolution,
        read_only_when_unresolved: bool,
    ) -> Result<PlayOutcome, EngineError> {
        let KeyedObserver { key, unresolved } = self.key_for(target_id, &resolution);

        let outcome = if unresolved && read_only_when_unresolved {
            match self.cache.peek(&key) {
                Some(record) => CacheOutcome::Existing(record),
                None => {
                    return Err(EngineError::NothingPublished {
                        target_id: key.target_id.clone(),
                        day_key: key.day_key,
                        bucket: key.bucket.clone(),
                    })
                }
            }
        } else {
            self.select_detached(&key, &resolution).await?
        };

        let status = if outcome.is_fresh() {
            PlayStatus::Success
        } else {
            PlayStatus::AlreadyUpdated
        };
        let record = outcome.into_record();

        if status == PlayStatus::AlreadyUpdated {
            debug!(key = %key, item_id = %record.item.id, "Card already updated for key");
        }

        let spotted_nearby = self
            .regionality
            .check(&record.item.id, &resolution.location)
            .await;

        Ok(PlayOutcome {
            status,
            record,
            resolution,
            day_key: key.day_key,
            bucket: key.bucket,
            spotted_nearby,
        })
    }

    /// Run the key's get-or-select on its own task
    ///
    /// Once started, the selection finishes and records its result even if
    /// the caller's future is dropped, so a publish that reached the target
    /// is never repeated for the same key.
    async fn select_detached(
        self: &Arc<Self>,
        key: &SelectionKey,
        resolution: &Resolution,
    ) -> Result<CacheOutcome, EngineError> {
        let engine = Arc::clone(self);
        let key = key.clone();
        let resolution = resolution.clone();
        let task = tokio::spawn(async move {
            engine
                .cache
                .get_or_select(&key, || engine.select_and_publish(&key, &resolution))
                .await
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Selection task did not complete");
                Err(EngineError::SelectionInterrupted(e.to_string()))
            }
        }
    }

    pub(super) fn key_for(&self, target_id: &str, resolution: &Resolution) -> KeyedObserver {
        let computed = self.day_keys.compute(&resolution.location);
        let bucket = if computed.global {
            LocationBucket::global()
        } else {
            self.bucketer.bucket(&resolution.location)
        };
        KeyedObserver {
            key: SelectionKey::new(target_id, computed.day_key, bucket),
            unresolved: !resolution.location.is_resolved(),
        }
    }

    /// Choose through the fallback tiers, publish, and build the record
    ///
    /// Runs under the key's gate. Nothing is stored unless the publish
    /// succeeds.
    async fn select_and_publish(
        &self,
        key: &SelectionKey,
        resolution: &Resolution,
    ) -> Result<SelectionRecord, EngineError> {
        let (item, tier) = self.choose(key, resolution).await?;

        let metadata = PublishMetadata {
            scope: PublishScope::Content,
            day_key: key.day_key,
            bucket: key.bucket.clone(),
            tier,
            location_label: resolution.location.location().map(Location::label),
        };

        let published = self
            .ledger
            .publish_content(&key.target_id, &item, || {
                self.publisher.publish(&key.target_id, &item, &metadata)
            })
            .await;
        if let Err(e) = published {
            warn!(
                key = %key,
                item_id = %item.id,
                tier = %tier,
                error = %e,
                "Publish failed, key left open for retry"
            );
            self.events.emit_lossy(EngineEvent::PublishFailed {
                target_id: key.target_id.clone(),
                day_key: key.day_key,
                bucket: key.bucket.clone(),
                item_id: item.id.clone(),
                tier,
                reason: e.to_string(),
                timestamp: self.clock.now(),
            });
            return Err(EngineError::PublishFailed {
                target_id: key.target_id.clone(),
                item_id: item.id,
                tier,
                reason: e.to_string(),
            });
        }

        let record = SelectionRecord::new(key, item, tier, self.clock.now());

        if tier == SelectionTier::Anchor && !key.bucket.is_global() {
            let global = SelectionRecord::new(
                &key.global(),
                record.item.clone(),
                tier,
                record.selected_at,
            );
            let stored = self.cache.insert_if_absent(global).await;
            debug!(
                day_key = %key.day_key,
                item_id = %stored.item.id,
                "Anchor choice persisted as global record"
            );
        }

        info!(
            key = %key,
            item_id = %record.item.id,
            tier = %tier,
            "Selected and published item"
        );
        self.events.emit_lossy(EngineEvent::ItemSelected {
            target_id: record.target_id.clone(),
            day_key: record.day_key,
            bucket: record.bucket.clone(),
            item_id: record.item.id.clone(),
            tier,
            timestamp: record.selected_at,
        });

        Ok(record)
    }

    async fn choose(
        &self,
        key: &SelectionKey,
        resolution: &Resolution,
    ) -> Result<(Item, SelectionTier), EngineError> {
        for &tier in &self.policy.fallback_order {
            let attempt = match tier {
                SelectionTier::LocationSource => self.from_location_source(resolution).await,
                SelectionTier::GlobalCache => Ok(self.from_global_cache(key)),
                SelectionTier::Anchor => self.from_anchor(key.day_key).await,
            };
            match attempt {
                Ok(Some(item)) => return Ok((item, tier)),
                Ok(None) => debug!(key = %key, tier = %tier, "Tier had no item"),
                Err(e) => debug!(key = %key, tier = %tier, error = %e, "Tier failed"),
            }
        }

        warn!(key = %key, "Every selection tier failed");
        Err(EngineError::SelectionExhausted {
            target_id: key.target_id.clone(),
            day_key: key.day_key,
        })
    }

    async fn from_location_source(
        &self,
        resolution: &Resolution,
    ) -> Result<Option<Item>, EngineError> {
        let location = resolution
            .location
            .location()
            .filter(|l| l.is_bucketable())
            .ok_or(EngineError::LocationUnresolved)?;

        self.selection_source
            .select_for_location(location)
            .await
            .map_err(|e| EngineError::ExternalSelectionUnavailable(e.to_string()))
    }

    fn from_global_cache(&self, key: &SelectionKey) -> Option<Item> {
        if key.bucket.is_global() {
            return None;
        }
        self.cache.peek(&key.global()).map(|record| record.item.clone())
    }

    async fn from_anchor(&self, day_key: DayKey) -> Result<Option<Item>, EngineError> {
        let Some(index) = anchor_index(day_key, self.anchors.len()) else {
            return Ok(None);
        };
        let anchor = &self.anchors[index];
        debug!(day_key = %day_key, index, anchor = %anchor.name, "Using anchor rotation");

        self.selection_source
            .select_from_anchor(index, anchor)
            .await
            .map_err(|e| EngineError::ExternalSelectionUnavailable(e.to_string()))
    }

    /// Drop expired sessions; returns how many were removed
    pub fn sweep_sessions(&self) -> usize {
        let expired = self.sessions.sweep_expired();
        let now = self.clock.now();
        for session in &expired {
            self.events.emit_lossy(EngineEvent::SessionExpired {
                session_id: session.session_id.clone(),
                item_id: session.item.id.clone(),
                timestamp: now,
            });
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "Swept expired sessions");
        }
        expired.len()
    }

    /// Drop records for day keys older than the retention window
    ///
    /// At least yesterday (UTC) is always kept: local dates west of UTC
    /// trail the UTC date by up to one day.
    pub fn sweep_records(&self) -> usize {
        let today = self.day_keys.today_utc().date();
        let retain_days = i64::from(self.retain_days.max(MIN_RETAIN_DAYS));
        let retain_from = today
            .checked_sub_signed(chrono::Duration::days(retain_days))
            .unwrap_or(today);

        let count = self.cache.evict_superseded(DayKey::new(retain_from));
        if count > 0 {
            info!(count, retain_from = %retain_from, "Evicted superseded selection records");
            self.events.emit_lossy(EngineEvent::RecordsEvicted {
                count,
                timestamp: self.clock.now(),
            });
        }
        count
    }
}

/// Oldest UTC day a record sweep may reach back to
const MIN_RETAIN_DAYS: u32 = 1;

/// Rotation index for `day_key`: `(year * 365 + day_of_year) mod count`
pub fn anchor_index(day_key: DayKey, count: usize) -> Option<usize> {
    if count == 0 {
        return None;
    }
    let date = day_key.date();
    let day_number = i64::from(date.year()) * 365 + i64::from(date.ordinal());
    Some(day_number.rem_euclid(count as i64) as usize)
}
