//! Location resolution cascade
//!
//! Tries, in order:
//! 1. IP geolocation of the observer's network address
//! 2. Device registry timezone → representative city (when a device id is
//!    known and tier 1 failed or returned a sentinel "don't know" location)
//! 3. Explicit [`ResolvedLocation::Unresolved`]
//!
//! There is deliberately no silent default city.

use birdcard_common::config::SentinelLocation;
use birdcard_common::{Location, LocationSource, ResolvedLocation};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::types::{DeviceRegistry, IpGeolocator};

const IP_CONFIDENCE: f32 = 0.8;
const DEVICE_TIMEZONE_CONFIDENCE: f32 = 0.4;
/// Degrees within which a provider answer counts as a sentinel
const SENTINEL_TOLERANCE_DEG: f64 = 0.01;

/// Resolved location plus how much to trust it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub location: ResolvedLocation,
    /// 0.0 (unknown) to 1.0
    pub confidence: f32,
}

impl Resolution {
    pub fn resolved(location: Location, confidence: f32) -> Self {
        Self {
            location: ResolvedLocation::Resolved(location),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn unresolved() -> Self {
        Self {
            location: ResolvedLocation::Unresolved,
            confidence: 0.0,
        }
    }
}

/// Resolves an observer's location from connection and device context
pub struct LocationResolver {
    ip_geo: Arc<dyn IpGeolocator>,
    devices: Option<Arc<dyn DeviceRegistry>>,
    sentinels: Vec<SentinelLocation>,
}

impl LocationResolver {
    pub fn new(
        ip_geo: Arc<dyn IpGeolocator>,
        devices: Option<Arc<dyn DeviceRegistry>>,
        sentinels: Vec<SentinelLocation>,
    ) -> Self {
        Self {
            ip_geo,
            devices,
            sentinels,
        }
    }

    pub async fn resolve(&self, address: Option<IpAddr>, device_id: Option<&str>) -> Resolution {
        if let Some(location) = self.from_ip(address).await {
            return Resolution::resolved(location, IP_CONFIDENCE);
        }

        if let Some(location) = self.from_device(device_id).await {
            return Resolution::resolved(location, DEVICE_TIMEZONE_CONFIDENCE);
        }

        info!(
            address = ?address,
            device_id = ?device_id,
            "Location unresolved, routing to global tier"
        );
        Resolution::unresolved()
    }

    async fn from_ip(&self, address: Option<IpAddr>) -> Option<Location> {
        let ip = address?;
        if !is_routable(ip) {
            debug!(%ip, "Skipping IP geolocation for non-routable address");
            return None;
        }

        match self.ip_geo.resolve(ip).await {
            Ok(location) if self.is_sentinel(&location) => {
                debug!(
                    %ip,
                    latitude = location.latitude,
                    longitude = location.longitude,
                    "IP geolocation returned sentinel location"
                );
                None
            }
            Ok(mut location) => {
                location.source = LocationSource::Ip;
                Some(location)
            }
            Err(e) => {
                debug!(%ip, error = %e, "IP geolocation failed");
                None
            }
        }
    }

    async fn from_device(&self, device_id: Option<&str>) -> Option<Location> {
        let device_id = device_id.filter(|id| !id.trim().is_empty())?;
        let devices = self.devices.as_ref()?;

        let timezone = match devices.timezone(device_id).await {
            Ok(tz) => tz,
            Err(e) => {
                debug!(device_id, error = %e, "Device registry lookup failed");
                return None;
            }
        };

        let location = timezone_location(&timezone);
        if location.is_none() {
            debug!(device_id, timezone = %timezone, "No representative city for device timezone");
        }
        location
    }

    fn is_sentinel(&self, location: &Location) -> bool {
        self.sentinels.iter().any(|s| {
            (s.latitude - location.latitude).abs() < SENTINEL_TOLERANCE_DEG
                && (s.longitude - location.longitude).abs() < SENTINEL_TOLERANCE_DEG
        })
    }
}

/// False for loopback, private, link-local and unspecified addresses
pub fn is_routable(ip: IpAddr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() {
        return false;
    }
    match ip {
        IpAddr::V4(v4) => !(v4.is_private() || v4.is_link_local() || v4.is_broadcast()),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            let unique_local = first & 0xfe00 == 0xfc00;
            let link_local = first & 0xffc0 == 0xfe80;
            !(unique_local || link_local)
        }
    }
}

/// Representative city for an IANA timezone
pub fn timezone_location(timezone: &str) -> Option<Location> {
    let (city, country, latitude, longitude) = match timezone.trim() {
        "America/New_York" | "US/Eastern" | "America/Detroit" => {
            ("New York", "United States", 40.71, -74.01)
        }
        "America/Chicago" | "US/Central" => ("Chicago", "United States", 41.88, -87.63),
        "America/Denver" | "US/Mountain" => ("Denver", "United States", 39.74, -104.99),
        "America/Phoenix" | "US/Arizona" => ("Phoenix", "United States", 33.45, -112.07),
        "America/Los_Angeles" | "US/Pacific" => ("Los Angeles", "United States", 34.05, -118.24),
        "America/Anchorage" | "US/Alaska" => ("Anchorage", "United States", 61.22, -149.90),
        "Pacific/Honolulu" | "US/Hawaii" => ("Honolulu", "United States", 21.31, -157.86),
        "America/Toronto" => ("Toronto", "Canada", 43.65, -79.38),
        "America/Vancouver" => ("Vancouver", "Canada", 49.28, -123.12),
        "America/Halifax" => ("Halifax", "Canada", 44.65, -63.57),
        "America/Mexico_City" => ("Mexico City", "Mexico", 19.43, -99.13),
        "America/Sao_Paulo" => ("São Paulo", "Brazil", -23.55, -46.63),
        "America/Argentina/Buenos_Aires" => ("Buenos Aires", "Argentina", -34.60, -58.38),
        "Europe/London" => ("London", "United Kingdom", 51.51, -0.13),
        "Europe/Dublin" => ("Dublin", "Ireland", 53.35, -6.26),
        "Europe/Lisbon" => ("Lisbon", "Portugal", 38.72, -9.14),
        "Europe/Madrid" => ("Madrid", "Spain", 40.42, -3.70),
        "Europe/Paris" => ("Paris", "France", 48.86, 2.35),
        "Europe/Amsterdam" => ("Amsterdam", "Netherlands", 52.37, 4.90),
        "Europe/Berlin" => ("Berlin", "Germany", 52.52, 13.40),
        "Europe/Rome" => ("Rome", "Italy", 41.90, 12.50),
        "Europe/Stockholm" => ("Stockholm", "Sweden", 59.33, 18.07),
        "Europe/Warsaw" => ("Warsaw", "Poland", 52.23, 21.01),
        "Europe/Helsinki" => ("Helsinki", "Finland", 60.17, 24.94),
        "Europe/Athens" => ("Athens", "Greece", 37.98, 23.73),
        "Europe/Moscow" => ("Moscow", "Russia", 55.76, 37.62),
        "Africa/Johannesburg" => ("Johannesburg", "South Africa", -26.20, 28.05),
        "Asia/Kolkata" | "Asia/Calcutta" => ("Delhi", "India", 28.61, 77.21),
        "Asia/Singapore" => ("Singapore", "Singapore", 1.35, 103.82),
        "Asia/Shanghai" => ("Shanghai", "China", 31.23, 121.47),
        "Asia/Seoul" => ("Seoul", "South Korea", 37.57, 126.98),
        "Asia/Tokyo" => ("Tokyo", "Japan", 35.68, 139.69),
        "Australia/Perth" => ("Perth", "Australia", -31.95, 115.86),
        "Australia/Adelaide" => ("Adelaide", "Australia", -34.93, 138.60),
        "Australia/Brisbane" => ("Brisbane", "Australia", -27.47, 153.03),
        "Australia/Melbourne" => ("Melbourne", "Australia", -37.81, 144.96),
        "Australia/Sydney" => ("Sydney", "Australia", -33.87, 151.21),
        "Pacific/Auckland" => ("Auckland", "New Zealand", -36.85, 174.76),
        _ => return None,
    };

    Some(
        Location::new(latitude, longitude, LocationSource::DeviceTimezone)
            .with_city(city)
            .with_country(country),
    )
}
