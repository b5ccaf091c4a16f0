//! Location model shared by the resolver, day key calculator and bucketer
//!
//! An observer's position is either [`ResolvedLocation::Resolved`] or
//! [`ResolvedLocation::Unresolved`]. There is no "default city": unknown stays
//! unknown and is routed to the global tier by the engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Where a location came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    /// IP geolocation of the request's network address
    Ip,
    /// Approximated from the device's configured timezone
    DeviceTimezone,
    /// Anchor or other global stand-in, never bucketed per location
    GlobalFallback,
}

/// A geographic position plus provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_name: Option<String>,
    pub source: LocationSource,
}

impl Location {
    /// Bare coordinates with no place names
    pub fn new(latitude: f64, longitude: f64, source: LocationSource) -> Self {
        Self {
            latitude,
            longitude,
            city_name: None,
            region_name: None,
            country_name: None,
            source,
        }
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city_name = Some(city.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region_name = Some(region.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country_name = Some(country.into());
        self
    }

    /// True when this location may own a per-location cache entry
    pub fn is_bucketable(&self) -> bool {
        self.source != LocationSource::GlobalFallback
    }

    /// Human label, most specific name first
    pub fn label(&self) -> String {
        match (&self.city_name, &self.region_name, &self.country_name) {
            (Some(city), Some(region), _) => format!("{city}, {region}"),
            (Some(city), None, Some(country)) => format!("{city}, {country}"),
            (Some(city), None, None) => city.clone(),
            (None, Some(region), _) => region.clone(),
            (None, None, Some(country)) => country.clone(),
            (None, None, None) => format!("{:.2},{:.2}", self.latitude, self.longitude),
        }
    }

    /// Great-circle distance in kilometres (haversine)
    pub fn distance_km(&self, other: &Location) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// Outcome of location resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResolvedLocation {
    Resolved(Location),
    Unresolved,
}

impl ResolvedLocation {
    pub fn location(&self) -> Option<&Location> {
        match self {
            ResolvedLocation::Resolved(location) => Some(location),
            ResolvedLocation::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolvedLocation::Resolved(_))
    }
}

/// Calendar day as experienced in an observer's timezone (`YYYY-MM-DD`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DayKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(DayKey)
            .map_err(|e| Error::InvalidInput(format!("day key {s:?}: {e}")))
    }
}

impl TryFrom<String> for DayKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DayKey> for String {
    fn from(value: DayKey) -> Self {
        value.to_string()
    }
}

/// Coarse geographic cache key
///
/// Either rounded coordinates (`"30.3,-97.7"`) or the reserved global bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationBucket(String);

impl LocationBucket {
    /// Reserved key for the no-location record
    pub const GLOBAL: &'static str = "global";

    pub fn global() -> Self {
        Self(Self::GLOBAL.to_string())
    }

    pub fn from_key(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn is_global(&self) -> bool {
        self.0 == Self::GLOBAL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_key_display_and_parse() {
        let key: DayKey = "2024-05-01".parse().unwrap();
        assert_eq!(key.to_string(), "2024-05-01");
        assert_eq!(key.date(), NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert!("2024-13-01".parse::<DayKey>().is_err());
    }

    #[test]
    fn test_day_key_serializes_as_string() {
        let key: DayKey = "2024-05-01".parse().unwrap();
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"2024-05-01\"");
        let back: DayKey = serde_json::from_str("\"2024-05-01\"").unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_global_bucket() {
        assert!(LocationBucket::global().is_global());
        assert!(!LocationBucket::from_key("30.3,-97.7").is_global());
    }

    #[test]
    fn test_fallback_locations_are_not_bucketable() {
        assert!(Location::new(30.27, -97.74, LocationSource::Ip).is_bucketable());
        assert!(Location::new(30.27, -97.74, LocationSource::DeviceTimezone).is_bucketable());
        assert!(!Location::new(51.5, -0.12, LocationSource::GlobalFallback).is_bucketable());
    }

    #[test]
    fn test_label_prefers_city_and_region() {
        let austin = Location::new(30.27, -97.74, LocationSource::Ip)
            .with_city("Austin")
            .with_region("Texas")
            .with_country("United States");
        assert_eq!(austin.label(), "Austin, Texas");
        assert_eq!(Location::new(1.0, 2.0, LocationSource::Ip).label(), "1.00,2.00");
    }

    #[test]
    fn test_distance_austin_to_houston() {
        let austin = Location::new(30.27, -97.74, LocationSource::Ip);
        let houston = Location::new(29.76, -95.37, LocationSource::Ip);
        let km = austin.distance_km(&houston);
        assert!((230.0..245.0).contains(&km), "got {km}");
    }

    #[test]
    fn test_resolved_location_accessors() {
        let resolved = ResolvedLocation::Resolved(Location::new(0.0, 0.0, LocationSource::Ip));
        assert!(resolved.is_resolved());
        assert!(resolved.location().is_some());
        assert!(ResolvedLocation::Unresolved.location().is_none());
    }
}
