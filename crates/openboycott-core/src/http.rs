use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::error::FetchError;

const USER_AGENT: &str = "openboycott/0.3";

/// Build an HTTP client with a fixed per-request timeout.
pub fn build_client(timeout_secs: u64, purpose: &str) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .with_context(|| format!("failed to build {purpose} HTTP client"))
}

/// Turn a non-success status into a classified [`FetchError`].
pub(crate) async fn ensure_success(
    service: &'static str,
    response: Response,
) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(FetchError::from_status(service, status, body))
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    service: &'static str,
    response: Response,
) -> Result<T, FetchError> {
    let response = ensure_success(service, response).await?;
    response
        .json::<T>()
        .await
        .map_err(|err| FetchError::from_reqwest(service, err))
}
