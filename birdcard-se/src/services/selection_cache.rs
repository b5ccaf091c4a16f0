//! Per-key selection records with at-most-once population
//!
//! Each `(target, day_key, bucket)` key owns a slot. The first caller for a
//! key runs the selection while holding the slot's async gate; every
//! concurrent caller for the same key waits on that gate and then reads the
//! stored record. Distinct keys never contend beyond the brief map lock.
//!
//! A record is stored only after its selection (publish included) succeeded,
//! so a failed attempt leaves the key open for the next caller.

use birdcard_common::{DayKey, Item, LocationBucket, SelectionTier};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::EngineError;

/// Identifies one daily selection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SelectionKey {
    pub target_id: String,
    pub day_key: DayKey,
    pub bucket: LocationBucket,
}

impl SelectionKey {
    pub fn new(target_id: impl Into<String>, day_key: DayKey, bucket: LocationBucket) -> Self {
        Self {
            target_id: target_id.into(),
            day_key,
            bucket,
        }
    }

    /// Same target and day, global bucket
    pub fn global(&self) -> Self {
        Self {
            target_id: self.target_id.clone(),
            day_key: self.day_key,
            bucket: LocationBucket::global(),
        }
    }
}

impl fmt::Display for SelectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.target_id, self.day_key, self.bucket)
    }
}

/// The item chosen for a key, immutable once stored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionRecord {
    pub target_id: String,
    pub day_key: DayKey,
    pub bucket: LocationBucket,
    pub item: Item,
    pub tier: SelectionTier,
    pub selected_at: DateTime<Utc>,
}

impl SelectionRecord {
    pub fn new(key: &SelectionKey, item: Item, tier: SelectionTier, selected_at: DateTime<Utc>) -> Self {
        Self {
            target_id: key.target_id.clone(),
            day_key: key.day_key,
            bucket: key.bucket.clone(),
            item,
            tier,
            selected_at,
        }
    }

    pub fn key(&self) -> SelectionKey {
        SelectionKey::new(self.target_id.clone(), self.day_key, self.bucket.clone())
    }
}

/// How a record was obtained
#[derive(Debug, Clone)]
pub enum CacheOutcome {
    /// Already stored by an earlier (or concurrent) caller
    Existing(Arc<SelectionRecord>),
    /// Produced by this call's selection
    Selected(Arc<SelectionRecord>),
}

impl CacheOutcome {
    pub fn record(&self) -> &Arc<SelectionRecord> {
        match self {
            CacheOutcome::Existing(record) | CacheOutcome::Selected(record) => record,
        }
    }

    pub fn into_record(self) -> Arc<SelectionRecord> {
        match self {
            CacheOutcome::Existing(record) | CacheOutcome::Selected(record) => record,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, CacheOutcome::Selected(_))
    }
}

#[derive(Default)]
struct Slot {
    gate: tokio::sync::Mutex<()>,
    record: OnceLock<Arc<SelectionRecord>>,
}

/// Concurrent map of selection keys to records
#[derive(Default)]
pub struct SelectionCache {
    slots: Mutex<HashMap<SelectionKey, Arc<Slot>>>,
}

impl SelectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &SelectionKey) -> Arc<Slot> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(key.clone()).or_default().clone()
    }

    /// Return the stored record for `key`, running `select` at most once
    /// successfully per key
    ///
    /// A `select` error is returned to this caller only and stores nothing;
    /// callers queued behind it get their own attempt.
    pub async fn get_or_select<F, Fut>(
        &self,
        key: &SelectionKey,
        select: F,
    ) -> Result<CacheOutcome, EngineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SelectionRecord, EngineError>>,
    {
        let slot = self.slot(key);
        if let Some(record) = slot.record.get() {
            return Ok(CacheOutcome::Existing(record.clone()));
        }

        let _gate = slot.gate.lock().await;
        if let Some(record) = slot.record.get() {
            return Ok(CacheOutcome::Existing(record.clone()));
        }

        let record = Arc::new(select().await?);
        let stored = slot.record.get_or_init(|| record.clone()).clone();
        Ok(CacheOutcome::Selected(stored))
    }

    /// Stored record for `key`, without waiting on an in-flight selection
    pub fn peek(&self, key: &SelectionKey) -> Option<Arc<SelectionRecord>> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(key).and_then(|slot| slot.record.get().cloned())
    }

    /// Store `record` under its own key unless one is already there
    ///
    /// Returns whichever record ends up stored.
    pub async fn insert_if_absent(&self, record: SelectionRecord) -> Arc<SelectionRecord> {
        let slot = self.slot(&record.key());
        let _gate = slot.gate.lock().await;
        slot.record.get_or_init(|| Arc::new(record)).clone()
    }

    /// Drop records whose day key is older than `retain_from`
    ///
    /// Slots with a selection in flight are left alone.
    pub fn evict_superseded(&self, retain_from: DayKey) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let before = slots.len();
        slots.retain(|key, slot| key.day_key >= retain_from || Arc::strong_count(slot) > 1);
        before - slots.len()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().filter(|slot| slot.record.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored records, oldest day first
    pub fn snapshot(&self) -> Vec<Arc<SelectionRecord>> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let mut records: Vec<_> = slots
            .values()
            .filter_map(|slot| slot.record.get().cloned())
            .collect();
        records.sort_by(|a, b| {
            a.day_key
                .cmp(&b.day_key)
                .then_with(|| a.bucket.as_str().cmp(b.bucket.as_str()))
        });
        records
    }
}
