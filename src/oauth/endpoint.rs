use super::AuthError;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// Authorization/token endpoint pair resolved from the instance's
/// well-known discovery document. Rarely changes, so callers cache it
/// for the process lifetime.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointPair {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
}

const DISCOVERY_ATTEMPTS: u64 = 3;

pub fn well_known_url(instance_base: &str) -> String {
    format!("{}/.well-known/oauth-authorization-server", instance_base)
}

/// Fetch and parse the discovery document, retrying with a short
/// backoff. Transport failure, bad JSON, or a missing/empty field all
/// surface as `AuthError::Discovery`.
pub async fn discover(client: &Client, well_known_url: &str) -> Result<EndpointPair, AuthError> {
    let mut last_err = String::new();
    for attempt in 1..=DISCOVERY_ATTEMPTS {
        if attempt > 1 {
            tokio::time::sleep(Duration::from_millis(250 * (attempt - 1))).await;
        }
        match fetch_document(client, well_known_url).await {
            Ok(pair) => return Ok(pair),
            Err(e) => {
                warn!("discovery attempt {}/{} failed: {}", attempt, DISCOVERY_ATTEMPTS, e);
                last_err = e;
            }
        }
    }
    Err(AuthError::Discovery(last_err))
}

async fn fetch_document(client: &Client, url: &str) -> Result<EndpointPair, String> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("request failed: {}", e))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(format!("discovery document returned {}", status));
    }
    let pair: EndpointPair = resp
        .json()
        .await
        .map_err(|e| format!("bad discovery document: {}", e))?;
    if pair.authorization_endpoint.is_empty() || pair.token_endpoint.is_empty() {
        return Err("discovery document is missing authorization_endpoint or token_endpoint".into());
    }
    Ok(pair)
}
