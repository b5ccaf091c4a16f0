//! eBird observational data client
//!
//! Serves as both the external selection source (most reported species near
//! a location) and the occurrence source for the "spotted nearby" check.

use async_trait::async_trait;
use birdcard_common::{Item, Location};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use super::http::{base_url, check_status, network_error, rate_limiter, DirectRateLimiter};
use crate::types::{ClientError, OccurrenceSource, SelectionSource};

/// eBird's maximum search radius
const MAX_DIST_KM: f64 = 50.0;
/// eBird's maximum look-back window
const MAX_BACK_DAYS: u32 = 30;
const SELECTION_DIST_KM: f64 = 25.0;
const SELECTION_BACK_DAYS: u32 = 7;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Observation {
    species_code: String,
    com_name: String,
    sci_name: Option<String>,
    how_many: Option<u32>,
}

/// Item id derived from a common name (`Northern Cardinal` → `Northern_Cardinal`)
pub fn item_id(common_name: &str) -> String {
    common_name.trim().replace(' ', "_")
}

/// Most reported species: most checklists, then most individuals, then
/// species code for a stable tie-break
fn most_reported(observations: &[Observation]) -> Option<&Observation> {
    let mut tallies: HashMap<&str, (u32, u32, &Observation)> = HashMap::new();
    for obs in observations {
        let entry = tallies.entry(obs.species_code.as_str()).or_insert((0, 0, obs));
        entry.0 += 1;
        entry.1 += obs.how_many.unwrap_or(1);
    }

    tallies
        .into_values()
        .max_by(|a, b| {
            a.0.cmp(&b.0)
                .then(a.1.cmp(&b.1))
                .then_with(|| b.2.species_code.cmp(&a.2.species_code))
        })
        .map(|(_, _, obs)| obs)
}

pub struct EBirdClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    rate_limiter: DirectRateLimiter,
    /// item id → eBird species code, learned from selections
    species_codes: Mutex<HashMap<String, String>>,
}

impl EBirdClient {
    pub fn new(client: Client, base: &str, token: Option<String>, requests_per_second: u32) -> Self {
        Self {
            client,
            base_url: base_url(base),
            token,
            rate_limiter: rate_limiter(requests_per_second),
            species_codes: Mutex::new(HashMap::new()),
        }
    }

    async fn recent(
        &self,
        path: &str,
        location: &Location,
        dist_km: f64,
        back_days: u32,
    ) -> Result<Vec<Observation>, ClientError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/data/obs/geo/recent{}", self.base_url, path);
        let dist = dist_km.clamp(0.0, MAX_DIST_KM).round() as u32;
        let back = back_days.clamp(1, MAX_BACK_DAYS);
        debug!(
            url = %url,
            lat = location.latitude,
            lng = location.longitude,
            dist,
            back,
            "Querying recent observations"
        );

        let mut request = self.client.get(&url).query(&[
            ("lat", format!("{:.2}", location.latitude)),
            ("lng", format!("{:.2}", location.longitude)),
            ("dist", dist.to_string()),
            ("back", back.to_string()),
        ]);
        if let Some(token) = &self.token {
            request = request.header("X-eBirdApiToken", token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| network_error("eBird", e))?;
        let response = check_status("eBird", response).await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("eBird observations: {e}")))
    }

    fn remember_species(&self, item_id: &str, species_code: &str) {
        self.species_codes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(item_id.to_string(), species_code.to_string());
    }

    fn species_code(&self, item_id: &str) -> Option<String> {
        self.species_codes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(item_id)
            .cloned()
    }
}

#[async_trait]
impl SelectionSource for EBirdClient {
    async fn select_for_location(&self, location: &Location) -> Result<Option<Item>, ClientError> {
        let observations = self
            .recent("", location, SELECTION_DIST_KM, SELECTION_BACK_DAYS)
            .await?;

        let Some(obs) = most_reported(&observations) else {
            debug!(location = %location.label(), "No recent observations near location");
            return Ok(None);
        };

        let id = item_id(&obs.com_name);
        self.remember_species(&id, &obs.species_code);
        Ok(Some(Item {
            id,
            common_name: obs.com_name.clone(),
            scientific_name: obs.sci_name.clone(),
            icon_url: None,
        }))
    }
}

#[async_trait]
impl OccurrenceSource for EBirdClient {
    async fn occurrences_near(
        &self,
        item_id: &str,
        location: &Location,
        radius_km: f64,
        window_days: u32,
    ) -> Result<u32, ClientError> {
        let count = match self.species_code(item_id) {
            Some(code) => {
                self.recent(&format!("/{code}"), location, radius_km, window_days)
                    .await?
                    .len()
            }
            None => self
                .recent("", location, radius_km, window_days)
                .await?
                .iter()
                .filter(|obs| self::item_id(&obs.com_name) == item_id)
                .count(),
        };
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}
