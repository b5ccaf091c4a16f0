//! Day key calculation
//!
//! A day key is "today" in the observer's own timezone, so two observers can
//! hold different day keys at the same instant. Timezone resolution cascade:
//! 1. External timezone lookup (offline polygon dataset), when configured
//! 2. Built-in coordinate-range rule table (degraded)
//! 3. UTC
//!
//! Unresolved observers always get the UTC day and are tagged global.

use birdcard_common::{Clock, DayKey, ResolvedLocation};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::debug;

use crate::types::TimezoneLookup;

/// Result of a day key computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputedDayKey {
    pub day_key: DayKey,
    /// Timezone the day was computed in
    pub timezone: Tz,
    /// Computed for an unresolved observer; never bucketed per location
    pub global: bool,
}

/// Maps locations to observer-local calendar dates
pub struct DayKeyCalculator {
    lookup: Option<Arc<dyn TimezoneLookup>>,
    rules: CoordinateRuleTable,
    clock: Arc<dyn Clock>,
}

impl DayKeyCalculator {
    pub fn new(lookup: Option<Arc<dyn TimezoneLookup>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            lookup,
            rules: CoordinateRuleTable::builtin(),
            clock,
        }
    }

    pub fn compute(&self, resolved: &ResolvedLocation) -> ComputedDayKey {
        match resolved.location() {
            Some(location) => {
                let timezone = self.timezone_for(location.latitude, location.longitude);
                ComputedDayKey {
                    day_key: self.today_in(timezone),
                    timezone,
                    global: false,
                }
            }
            None => ComputedDayKey {
                day_key: self.today_utc(),
                timezone: Tz::UTC,
                global: true,
            },
        }
    }

    /// Current day in UTC (the global day)
    pub fn today_utc(&self) -> DayKey {
        DayKey::new(self.clock.now().date_naive())
    }

    fn today_in(&self, timezone: Tz) -> DayKey {
        DayKey::new(self.clock.now().with_timezone(&timezone).date_naive())
    }

    fn timezone_for(&self, latitude: f64, longitude: f64) -> Tz {
        if let Some(lookup) = &self.lookup {
            match lookup.timezone_for(latitude, longitude).map(|name| name.parse::<Tz>()) {
                Some(Ok(tz)) => return tz,
                Some(Err(e)) => {
                    debug!(latitude, longitude, error = %e, "Timezone lookup returned unknown zone")
                }
                None => debug!(latitude, longitude, "Timezone lookup had no zone"),
            }
        }

        if let Some(tz) = self.rules.lookup(latitude, longitude) {
            return tz;
        }

        debug!(latitude, longitude, "No timezone rule matched, using UTC");
        Tz::UTC
    }
}

/// One coordinate box mapped to a zone
#[derive(Debug, Clone, Copy)]
struct TimezoneRule {
    lat: (f64, f64),
    lon: (f64, f64),
    zone: Tz,
}

fn rule(lat: (f64, f64), lon: (f64, f64), zone: Tz) -> TimezoneRule {
    TimezoneRule { lat, lon, zone }
}

/// Degraded coordinate-range → timezone table
///
/// First match wins, so narrower boxes come before the broad ones they sit in.
#[derive(Debug, Clone)]
pub struct CoordinateRuleTable {
    rules: Vec<TimezoneRule>,
}

impl CoordinateRuleTable {
    pub fn builtin() -> Self {
        use chrono_tz::America;
        use chrono_tz::Asia;
        use chrono_tz::Australia;
        use chrono_tz::Europe;
        use chrono_tz::Pacific;

        Self {
            rules: vec![
                // North America
                rule((18.0, 23.0), (-161.0, -154.0), Pacific::Honolulu),
                rule((51.0, 72.0), (-170.0, -130.0), America::Anchorage),
                rule((31.3, 37.0), (-114.8, -109.05), America::Phoenix),
                rule((14.0, 23.0), (-106.0, -86.0), America::Mexico_City),
                rule((30.0, 60.0), (-125.0, -114.5), America::Los_Angeles),
                rule((25.0, 60.0), (-114.5, -102.0), America::Denver),
                rule((14.0, 60.0), (-102.0, -87.5), America::Chicago),
                rule((24.0, 60.0), (-87.5, -67.0), America::New_York),
                rule((43.0, 60.0), (-67.0, -52.0), America::Halifax),
                // South America
                rule((-34.0, 5.0), (-53.0, -34.0), America::Sao_Paulo),
                rule((-56.0, -21.0), (-74.0, -53.0), America::Argentina::Buenos_Aires),
                // Europe
                rule((49.8, 61.0), (-11.0, 2.0), Europe::London),
                rule((36.9, 42.2), (-9.6, -6.2), Europe::Lisbon),
                rule((35.0, 71.0), (-10.0, 15.5), Europe::Paris),
                rule((35.0, 71.0), (15.5, 24.0), Europe::Warsaw),
                rule((35.0, 70.0), (24.0, 32.0), Europe::Helsinki),
                rule((40.0, 70.0), (32.0, 60.0), Europe::Moscow),
                // Asia
                rule((6.0, 36.0), (68.0, 97.5), Asia::Kolkata),
                rule((24.0, 46.0), (128.0, 146.0), Asia::Tokyo),
                rule((33.0, 39.0), (124.0, 130.0), Asia::Seoul),
                rule((18.0, 54.0), (97.5, 135.0), Asia::Shanghai),
                // Oceania
                rule((-29.0, -10.0), (138.0, 154.0), Australia::Brisbane),
                rule((-44.0, -28.0), (141.0, 154.0), Australia::Sydney),
                rule((-38.0, -10.0), (129.0, 141.0), Australia::Adelaide),
                rule((-36.0, -13.0), (112.0, 129.0), Australia::Perth),
                rule((-48.0, -34.0), (166.0, 179.0), Pacific::Auckland),
            ],
        }
    }

    pub fn lookup(&self, latitude: f64, longitude: f64) -> Option<Tz> {
        self.rules
            .iter()
            .find(|r| {
                (r.lat.0..=r.lat.1).contains(&latitude) && (r.lon.0..=r.lon.1).contains(&longitude)
            })
            .map(|r| r.zone)
    }
}

impl TimezoneLookup for CoordinateRuleTable {
    fn timezone_for(&self, latitude: f64, longitude: f64) -> Option<String> {
        self.lookup(latitude, longitude).map(|tz| tz.name().to_string())
    }
}
