//! HTTP client construction for provider implementations.

use std::time::Duration;

use reqwest::Client;

const API_TIMEOUT_ENV: &str = "TIERFLOW_API_TIMEOUT_MS";
const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// Build the shared HTTP client. Every provider call carries a deadline;
/// `TIERFLOW_API_TIMEOUT_MS` overrides the default of two minutes.
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    let timeout_ms = std::env::var(API_TIMEOUT_ENV)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_TIMEOUT_MS);

    Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .connect_timeout(Duration::from_secs(10))
        .build()
}
