//! Collaborator seams for the selection engine
//!
//! Every external service the engine talks to sits behind one of these
//! traits. Production wires the reqwest clients from [`crate::clients`];
//! tests wire in-memory fakes.

use async_trait::async_trait;
use birdcard_common::config::AnchorConfig;
use birdcard_common::{DayKey, Item, Location, LocationBucket, LocationSource, SelectionTier};
use serde::Serialize;
use std::net::IpAddr;
use thiserror::Error;

/// Failure talking to an external collaborator
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure (DNS, connect, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Collaborator answered with an error status
    #[error("API error: {0}")]
    Api(String),

    /// Response body did not match the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Collaborator has no data for the request
    #[error("Not available: {0}")]
    NotAvailable(String),

    /// Client could not be configured
    #[error("Client configuration error: {0}")]
    Config(String),
}

/// IP address → location
#[async_trait]
pub trait IpGeolocator: Send + Sync {
    async fn resolve(&self, ip: IpAddr) -> Result<Location, ClientError>;
}

/// Device id → configured IANA timezone name
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn timezone(&self, device_id: &str) -> Result<String, ClientError>;
}

/// Coordinates → IANA timezone name
///
/// Synchronous: implementations are expected to be offline datasets.
pub trait TimezoneLookup: Send + Sync {
    fn timezone_for(&self, latitude: f64, longitude: f64) -> Option<String>;
}

/// One entry of the fixed anchor rotation
#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub name: String,
    pub location: Location,
}

impl From<&AnchorConfig> for Anchor {
    fn from(config: &AnchorConfig) -> Self {
        Self {
            name: config.name.clone(),
            location: Location::new(
                config.latitude,
                config.longitude,
                LocationSource::GlobalFallback,
            )
            .with_city(config.name.clone()),
        }
    }
}

/// External content selection source
///
/// `Ok(None)` is the "not found" answer: the source works but has nothing
/// for this location.
#[async_trait]
pub trait SelectionSource: Send + Sync {
    async fn select_for_location(&self, location: &Location) -> Result<Option<Item>, ClientError>;

    /// Pick the item for anchor `index` of the rotation
    async fn select_from_anchor(
        &self,
        _index: usize,
        anchor: &Anchor,
    ) -> Result<Option<Item>, ClientError> {
        self.select_for_location(&anchor.location).await
    }
}

/// What a publish call updates on the shared target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishScope {
    /// The card content itself
    Content,
    /// Auxiliary display metadata (title, icon) only
    DisplayOnly,
}

/// Context sent along with a publish
#[derive(Debug, Clone, Serialize)]
pub struct PublishMetadata {
    pub scope: PublishScope,
    pub day_key: DayKey,
    pub bucket: LocationBucket,
    pub tier: SelectionTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_label: Option<String>,
}

/// Shared-resource publishing API
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        target_id: &str,
        item: &Item,
        metadata: &PublishMetadata,
    ) -> Result<(), ClientError>;
}

/// Observational data: recent sightings of an item near a location
#[async_trait]
pub trait OccurrenceSource: Send + Sync {
    async fn occurrences_near(
        &self,
        item_id: &str,
        location: &Location,
        radius_km: f64,
        window_days: u32,
    ) -> Result<u32, ClientError>;
}
