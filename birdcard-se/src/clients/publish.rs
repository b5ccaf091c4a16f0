//! Shared-target publish API client

use async_trait::async_trait;
use birdcard_common::Item;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::http::{base_url, check_status, network_error, rate_limiter, DirectRateLimiter};
use crate::types::{ClientError, PublishMetadata, PublishScope, Publisher};

#[derive(Debug, Serialize)]
struct CardBody<'a> {
    item_id: &'a str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scientific_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_url: Option<&'a str>,
    #[serde(flatten)]
    metadata: &'a PublishMetadata,
}

pub struct HttpPublisher {
    client: Client,
    base_url: String,
    token: Option<String>,
    rate_limiter: DirectRateLimiter,
}

impl HttpPublisher {
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
impl Publisher for HttpPublisher {
    async fn publish(
        &self,
        target_id: &str,
        item: &Item,
        metadata: &PublishMetadata,
    ) -> Result<(), ClientError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/targets/{}/card", self.base_url, target_id);
        let body = CardBody {
            item_id: &item.id,
            title: &item.common_name,
            scientific_name: item.scientific_name.as_deref(),
            icon_url: item.icon_url.as_deref(),
            metadata,
        };
        debug!(
            target_id,
            item_id = %item.id,
            display_only = metadata.scope == PublishScope::DisplayOnly,
            "Publishing card"
        );

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| network_error("Publish API", e))?;
        check_status("Publish API", response).await?;
        Ok(())
    }
}
