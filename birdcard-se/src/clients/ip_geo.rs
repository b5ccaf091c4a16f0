//! ip-api.com style IP geolocation client

use async_trait::async_trait;
use birdcard_common::{Location, LocationSource};
use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;
use tracing::debug;

use super::http::{base_url, check_status, network_error, rate_limiter, DirectRateLimiter};
use crate::types::{ClientError, IpGeolocator};

const FIELDS: &str = "status,message,country,regionName,city,lat,lon";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    status: String,
    message: Option<String>,
    country: Option<String>,
    region_name: Option<String>,
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

impl IpApiResponse {
    fn into_location(self, ip: IpAddr) -> Result<Location, ClientError> {
        if self.status != "success" {
            return Err(ClientError::NotAvailable(format!(
                "IP geolocation for {ip}: {}",
                self.message.unwrap_or_else(|| self.status.clone())
            )));
        }
        let (Some(lat), Some(lon)) = (self.lat, self.lon) else {
            return Err(ClientError::Parse(format!(
                "IP geolocation for {ip} has no coordinates"
            )));
        };

        let mut location = Location::new(lat, lon, LocationSource::Ip);
        location.city_name = self.city.filter(|s| !s.is_empty());
        location.region_name = self.region_name.filter(|s| !s.is_empty());
        location.country_name = self.country.filter(|s| !s.is_empty());
        Ok(location)
    }
}

pub struct IpApiClient {
    client: Client,
    base_url: String,
    rate_limiter: DirectRateLimiter,
}

impl IpApiClient {
    pub fn new(client: Client, base: &str, requests_per_second: u32) -> Self {
        Self {
            client,
            base_url: base_url(base),
            rate_limiter: rate_limiter(requests_per_second),
        }
    }
}

#[async_trait]
impl IpGeolocator for IpApiClient {
    async fn resolve(&self, ip: IpAddr) -> Result<Location, ClientError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/json/{}", self.base_url, ip);
        debug!(%ip, "Querying IP geolocation");

        let response = self
            .client
            .get(&url)
            .query(&[("fields", FIELDS)])
            .send()
            .await
            .map_err(|e| network_error("IP geolocation", e))?;
        let response = check_status("IP geolocation", response).await?;

        let body: IpApiResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("IP geolocation response: {e}")))?;
        body.into_location(ip)
    }
}
