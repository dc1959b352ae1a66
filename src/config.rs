use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::PathBuf;

use crate::oauth::pkce::{MAX_VERIFIER_LEN, MIN_VERIFIER_LEN};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Misskey instance the app authenticates against.
    #[serde(default = "default_host")]
    pub host: String,

    /// Login flow: "miauth" (legacy single-endpoint) or "oauth" (PKCE).
    #[serde(default = "default_flow")]
    pub flow: String,

    /// OAuth client identifier. Misskey expects the app's public URL here,
    /// so an empty value falls back to `public_base_url`.
    #[serde(default)]
    pub client_id: String,

    /// Permission/scope requested for the access token. Timeline reads and
    /// follow checks only need account read access.
    #[serde(default = "default_permission")]
    pub permission: String,

    /// URL this app is reachable at from the user's browser. Scheme is
    /// taken from here verbatim; it is never inferred per-request.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PKCE code verifier length, 43..=128 per RFC 7636.
    #[serde(default = "default_verifier_length")]
    pub verifier_length: usize,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_timeline_limit")]
    pub timeline_limit: u32,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Base URL override for the remote instance (normally derived from
    /// `host`). Useful for tests and self-hosted setups behind proxies.
    #[serde(default)]
    pub instance_base: Option<String>,

    /// Static endpoints used when well-known discovery keeps failing.
    #[serde(default)]
    pub fallback_authorization_endpoint: Option<String>,
    #[serde(default)]
    pub fallback_token_endpoint: Option<String>,
}

fn default_host() -> String { "misskey.io".into() }
fn default_flow() -> String { "miauth".into() }
fn default_permission() -> String { "read:account".into() }
fn default_public_base_url() -> String { "http://localhost:8080".into() }
fn default_bind_addr() -> String { "0.0.0.0:8080".into() }
fn default_verifier_length() -> usize { 128 }
fn default_http_timeout() -> u64 { 10 }
fn default_timeline_limit() -> u32 { 100 }
fn default_log_dir() -> PathBuf { "/var/log/art-explorer".into() }

impl Default for Config {
    fn default() -> Self {
        Config {
            host: default_host(),
            flow: default_flow(),
            client_id: String::new(),
            permission: default_permission(),
            public_base_url: default_public_base_url(),
            bind_addr: default_bind_addr(),
            verifier_length: default_verifier_length(),
            http_timeout_secs: default_http_timeout(),
            timeline_limit: default_timeline_limit(),
            log_dir: default_log_dir(),
            instance_base: None,
            fallback_authorization_endpoint: None,
            fallback_token_endpoint: None,
        }
    }
}

impl Config {
    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.flow != "miauth" && self.flow != "oauth" {
            return Err(anyhow!("flow must be \"miauth\" or \"oauth\", got {:?}", self.flow));
        }
        if self.verifier_length < MIN_VERIFIER_LEN || self.verifier_length > MAX_VERIFIER_LEN {
            return Err(anyhow!(
                "verifier_length must be in {}..={}, got {}",
                MIN_VERIFIER_LEN,
                MAX_VERIFIER_LEN,
                self.verifier_length
            ));
        }
        let base = url::Url::parse(&self.public_base_url)
            .map_err(|e| anyhow!("public_base_url is not a valid URL: {}", e))?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(anyhow!("public_base_url must be http or https"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host must not be empty"));
        }
        Ok(())
    }

    /// Effective OAuth client id (see the field docs).
    pub fn client_id(&self) -> &str {
        if self.client_id.is_empty() {
            &self.public_base_url
        } else {
            &self.client_id
        }
    }
}
