//! Device registry client (device id → configured timezone)

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::http::{base_url, check_status, network_error, rate_limiter, DirectRateLimiter};
use crate::types::{ClientError, DeviceRegistry};

#[derive(Debug, Deserialize)]
struct DeviceResponse {
    timezone: Option<String>,
}

pub struct HttpDeviceRegistry {
    client: Client,
    base_url: String,
    token: Option<String>,
    rate_limiter: DirectRateLimiter,
}

impl HttpDeviceRegistry {
    pub fn new(client: Client, base: &str, token: Option<String>, requests_per_second: u32) -> Self {
        Self {
            client,
            base_url: base_url(base),
            token,
            rate_limiter: rate_limiter(requests_per_second),
        }
    }
}

#[async_trait]
impl DeviceRegistry for HttpDeviceRegistry {
    async fn timezone(&self, device_id: &str) -> Result<String, ClientError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/devices/{}", self.base_url, device_id);
        debug!(device_id, "Querying device registry");

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| network_error("Device registry", e))?;
        let response = check_status("Device registry", response).await?;

        let body: DeviceResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("Device registry response: {e}")))?;

        body.timezone
            .filter(|tz| !tz.trim().is_empty())
            .ok_or_else(|| {
                ClientError::NotAvailable(format!("Device {device_id} has no timezone configured"))
            })
    }
}
