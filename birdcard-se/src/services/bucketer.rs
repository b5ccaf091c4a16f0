//! Location bucketing
//!
//! Rounds coordinates so observers within roughly city-scale distance share
//! one cache entry. Unresolved and fallback locations all land in the
//! reserved global bucket.

use birdcard_common::{Location, LocationBucket, ResolvedLocation};

/// Maps locations to coarse cache keys
#[derive(Debug, Clone, Copy)]
pub struct LocationBucketer {
    decimals: u8,
}

impl LocationBucketer {
    /// `decimals` = digits kept after the decimal point (1 ≈ 11 km)
    pub fn new(decimals: u8) -> Self {
        Self { decimals }
    }

    pub fn bucket(&self, resolved: &ResolvedLocation) -> LocationBucket {
        match resolved.location() {
            Some(location) => self.bucket_for(location),
            None => LocationBucket::global(),
        }
    }

    pub fn bucket_for(&self, location: &Location) -> LocationBucket {
        if !location.is_bucketable() {
            return LocationBucket::global();
        }
        LocationBucket::from_key(format!(
            "{},{}",
            self.round(location.latitude),
            self.round(location.longitude)
        ))
    }

    fn round(&self, value: f64) -> String {
        let factor = 10f64.powi(i32::from(self.decimals));
        let rounded = (value * factor).round() / factor;
        // -0.0 and 0.0 must share a bucket
        let rounded = if rounded == 0.0 { 0.0 } else { rounded };
        format!("{:.*}", usize::from(self.decimals), rounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use birdcard_common::LocationSource;

    fn ip(lat: f64, lon: f64) -> ResolvedLocation {
        ResolvedLocation::Resolved(Location::new(lat, lon, LocationSource::Ip))
    }

    #[test]
    fn test_austin_bucket() {
        let bucketer = LocationBucketer::new(1);
        assert_eq!(bucketer.bucket(&ip(30.27, -97.74)).as_str(), "30.3,-97.7");
    }

    #[test]
    fn test_nearby_observers_collide() {
        let bucketer = LocationBucketer::new(1);
        assert_eq!(bucketer.bucket(&ip(30.27, -97.74)), bucketer.bucket(&ip(30.31, -97.71)));
        assert_ne!(bucketer.bucket(&ip(30.27, -97.74)), bucketer.bucket(&ip(29.76, -95.37)));
    }

    #[test]
    fn test_negative_zero_is_normalized() {
        let bucketer = LocationBucketer::new(1);
        assert_eq!(bucketer.bucket(&ip(-0.04, 0.03)).as_str(), "0.0,0.0");
    }

    #[test]
    fn test_precision_is_configurable() {
        assert_eq!(LocationBucketer::new(0).bucket(&ip(30.27, -97.74)).as_str(), "30,-98");
        assert_eq!(LocationBucketer::new(2).bucket(&ip(30.27, -97.74)).as_str(), "30.27,-97.74");
    }

    #[test]
    fn test_unresolved_and_fallback_use_global_bucket() {
        let bucketer = LocationBucketer::new(1);
        assert!(bucketer.bucket(&ResolvedLocation::Unresolved).is_global());

        let anchor = Location::new(40.78, -73.97, LocationSource::GlobalFallback);
        assert!(bucketer.bucket_for(&anchor).is_global());
    }
}
