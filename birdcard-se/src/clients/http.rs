//! Shared HTTP plumbing for collaborator clients
//!
//! One reqwest client (connection pool) shared by every collaborator, plus a
//! token-bucket limiter per collaborator.

use birdcard_common::config::CollaboratorConfig;
use governor::{Quota, RateLimiter};
use reqwest::{Client, Response};
use std::num::NonZeroU32;
use std::time::Duration;

use crate::types::ClientError;

pub type DirectRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub const USER_AGENT: &str = concat!("birdcard-se/", env!("CARGO_PKG_VERSION"));

/// Build the shared HTTP client with the configured timeouts
pub fn build_client(config: &CollaboratorConfig) -> Result<Client, ClientError> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ClientError::Config(format!("Failed to build HTTP client: {e}")))
}

/// Limiter allowing `requests_per_second` (minimum 1)
pub fn rate_limiter(requests_per_second: u32) -> DirectRateLimiter {
    RateLimiter::direct(Quota::per_second(
        NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN),
    ))
}

/// Strip trailing slashes so paths can be appended with `/`
pub fn base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Map a transport error
pub fn network_error(service: &str, e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Network(format!("{service} request timed out: {e}"))
    } else {
        ClientError::Network(format!("{service} request failed: {e}"))
    }
}

/// Pass successful responses through; turn error statuses into [`ClientError`]
///
/// 404 maps to `NotAvailable`, everything else to `Api` with the body text.
pub async fn check_status(service: &str, response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ClientError::NotAvailable(format!("{service} returned 404: {body}")));
    }
    Err(ClientError::Api(format!("{service} returned {status}: {body}")))
}
