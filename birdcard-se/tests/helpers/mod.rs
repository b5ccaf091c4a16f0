//! Shared test fixtures: in-memory collaborators and an engine harness
#![allow(dead_code)]

use async_trait::async_trait;
use birdcard_common::config::EngineConfig;
use birdcard_common::events::{EngineEvent, EventBus};
use birdcard_common::{Item, Location, LocationSource, ManualClock};
use birdcard_se::services::{
    Collaborators, PlayOutcome, PlayRequest, SelectionEngine, TrackRequest, TrackResponse,
};
use birdcard_se::types::{
    Anchor, ClientError, IpGeolocator, OccurrenceSource, PublishMetadata, PublishScope, Publisher,
    SelectionSource,
};
use birdcard_se::EngineError;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub const AUSTIN_IP: &str = "203.0.113.10";
pub const AUSTIN_NEIGHBOR_IP: &str = "203.0.113.11";
pub const HOUSTON_IP: &str = "198.51.100.20";
pub const LONDON_IP: &str = "198.51.100.44";
pub const PRIVATE_IP: &str = "10.0.0.5";

pub const AUSTIN_BUCKET: &str = "30.3,-97.7";
pub const HOUSTON_BUCKET: &str = "29.8,-95.4";
pub const ASSET_BASE: &str = "http://assets.test";

/// 2024-05-01 12:00 in Austin, 18:00 in London
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 17, 0, 0).unwrap()
}

pub fn anchor_item(index: usize) -> Item {
    Item::from_id(format!("Anchor_Bird_{index}"))
}

// ========================================
// Fake collaborators
// ========================================

#[derive(Default)]
pub struct FakeIpGeo {
    answers: HashMap<IpAddr, Location>,
    pub calls: AtomicUsize,
}

impl FakeIpGeo {
    pub fn standard() -> Self {
        let mut answers = HashMap::new();
        let mut add = |ip: &str, lat: f64, lon: f64, city: &str| {
            answers.insert(
                ip.parse().unwrap(),
                Location::new(lat, lon, LocationSource::Ip).with_city(city),
            );
        };
        add(AUSTIN_IP, 30.27, -97.74, "Austin");
        add(AUSTIN_NEIGHBOR_IP, 30.31, -97.71, "Austin");
        add(HOUSTON_IP, 29.76, -95.37, "Houston");
        add(LONDON_IP, 51.51, -0.13, "London");
        Self {
            answers,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl IpGeolocator for FakeIpGeo {
    async fn resolve(&self, ip: IpAddr) -> Result<Location, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .get(&ip)
            .cloned()
            .ok_or_else(|| ClientError::NotAvailable(ip.to_string()))
    }
}

/// Answers per location (nearest configured point within half a degree)
/// and per anchor index
#[derive(Default)]
pub struct FakeSelectionSource {
    by_location: Mutex<Vec<(f64, f64, Item)>>,
    pub fail: AtomicBool,
    pub location_calls: AtomicUsize,
    pub anchor_calls: Mutex<Vec<usize>>,
}

impl FakeSelectionSource {
    pub fn standard() -> Self {
        let source = Self::default();
        source.set_location_item(30.27, -97.74, Item::from_id("Northern_Cardinal"));
        source.set_location_item(51.51, -0.13, Item::from_id("European_Robin"));
        source
    }

    pub fn set_location_item(&self, lat: f64, lon: f64, item: Item) {
        let mut entries = self.by_location.lock().unwrap();
        entries.retain(|(a, b, _)| (a - lat).abs() > 1e-9 || (b - lon).abs() > 1e-9);
        entries.push((lat, lon, item));
    }

    pub fn location_calls(&self) -> usize {
        self.location_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SelectionSource for FakeSelectionSource {
    async fn select_for_location(&self, location: &Location) -> Result<Option<Item>, ClientError> {
        self.location_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::Network("selection source down".into()));
        }
        let entries = self.by_location.lock().unwrap();
        Ok(entries
            .iter()
            .find(|(lat, lon, _)| {
                (lat - location.latitude).abs() < 0.5 && (lon - location.longitude).abs() < 0.5
            })
            .map(|(_, _, item)| item.clone()))
    }

    async fn select_from_anchor(
        &self,
        index: usize,
        _anchor: &Anchor,
    ) -> Result<Option<Item>, ClientError> {
        self.anchor_calls.lock().unwrap().push(index);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::Network("selection source down".into()));
        }
        Ok(Some(anchor_item(index)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub target_id: String,
    pub item_id: String,
    pub scope: PublishScope,
}

#[derive(Default)]
pub struct FakePublisher {
    pub published: Mutex<Vec<Published>>,
    /// Publish calls that reached the target, acknowledged or not
    pub attempts: AtomicUsize,
    pub fail: AtomicBool,
    pub delay: Mutex<Option<Duration>>,
}

impl FakePublisher {
    pub fn content_count(&self) -> usize {
        self.count(PublishScope::Content)
    }

    pub fn display_count(&self) -> usize {
        self.count(PublishScope::DisplayOnly)
    }

    fn count(&self, scope: PublishScope) -> usize {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.scope == scope)
            .count()
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(
        &self,
        target_id: &str,
        item: &Item,
        metadata: &PublishMetadata,
    ) -> Result<(), ClientError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::Api("503 Service Unavailable".into()));
        }
        self.published.lock().unwrap().push(Published {
            target_id: target_id.to_string(),
            item_id: item.id.clone(),
            scope: metadata.scope,
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeOccurrences {
    pub nearby: Mutex<HashSet<String>>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl OccurrenceSource for FakeOccurrences {
    async fn occurrences_near(
        &self,
        item_id: &str,
        _location: &Location,
        _radius_km: f64,
        _window_days: u32,
    ) -> Result<u32, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(if self.nearby.lock().unwrap().contains(item_id) {
            4
        } else {
            0
        })
    }
}

// ========================================
// Harness
// ========================================

pub struct Harness {
    pub engine: Arc<SelectionEngine>,
    pub clock: Arc<ManualClock>,
    pub ip_geo: Arc<FakeIpGeo>,
    pub source: Arc<FakeSelectionSource>,
    pub publisher: Arc<FakePublisher>,
    pub occurrences: Arc<FakeOccurrences>,
    pub events: EventBus,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(customize: impl FnOnce(&mut EngineConfig)) -> Self {
        let mut config = EngineConfig::default();
        config.collaborators.asset_base_url = ASSET_BASE.to_string();
        customize(&mut config);

        let clock = Arc::new(ManualClock::new(start_time()));
        let ip_geo = Arc::new(FakeIpGeo::standard());
        let source = Arc::new(FakeSelectionSource::standard());
        let publisher = Arc::new(FakePublisher::default());
        let occurrences = Arc::new(FakeOccurrences::default());
        let events = EventBus::new(1024);

        let collaborators = Collaborators {
            ip_geo: ip_geo.clone(),
            device_registry: None,
            timezone_lookup: None,
            selection_source: source.clone(),
            publisher: publisher.clone(),
            occurrences: occurrences.clone(),
        };
        let engine = Arc::new(SelectionEngine::new(
            &config,
            collaborators,
            clock.clone(),
            events.clone(),
        ));

        Self {
            engine,
            clock,
            ip_geo,
            source,
            publisher,
            occurrences,
            events,
        }
    }

    pub async fn play(&self, ip: &str) -> Result<PlayOutcome, EngineError> {
        self.engine.handle_play(&play_request(ip)).await
    }

    pub async fn fetch(
        &self,
        session_id: Option<&str>,
        ip: &str,
    ) -> Result<TrackResponse, EngineError> {
        self.engine.fetch_track(&track_request(session_id, ip)).await
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.clock.advance(chrono::Duration::minutes(minutes));
    }
}

pub fn play_request(ip: &str) -> PlayRequest {
    PlayRequest {
        target_id: "CARD1".to_string(),
        device_id: None,
        address: Some(ip.parse().unwrap()),
    }
}

pub fn track_request(session_id: Option<&str>, ip: &str) -> TrackRequest {
    TrackRequest {
        session_id: session_id.map(str::to_string),
        kind: birdcard_common::TrackKind::Welcome,
        target_id: "CARD1".to_string(),
        device_id: None,
        address: Some(ip.parse().unwrap()),
    }
}

/// Every event currently queued on `rx`
pub fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn event_types(events: &[EngineEvent]) -> Vec<&'static str> {
    events.iter().map(EngineEvent::event_type).collect()
}
