use crate::config::Config;
use std::time::Duration;

/// Base URL the app is reachable at, without a trailing slash. The scheme
/// comes from configuration, never from per-request TLS sniffing.
pub fn root_path(cfg: &Config) -> String {
    cfg.public_base_url.trim_end_matches('/').to_string()
}

/// Callback URL registered with the remote service.
pub fn redirect_uri(cfg: &Config) -> String {
    format!("{}/redirect", root_path(cfg))
}

/// Base URL of the remote Misskey instance, e.g. "https://misskey.io".
pub fn instance_base(cfg: &Config) -> String {
    match &cfg.instance_base {
        Some(base) => base.trim_end_matches('/').to_string(),
        None => format!("https://{}", cfg.host),
    }
}

/// Shared HTTP client. Every remote call uses the configured timeout so
/// a stalled instance cannot hold a handler open indefinitely.
pub fn http_client(cfg: &Config) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.http_timeout_secs))
        .build()?;
    Ok(client)
}
