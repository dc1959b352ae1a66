use crate::config::Config;
use crate::oauth::AuthError;
use crate::session::{pending_expired, AccessToken, MiauthLogin, PendingLogin, SessionStore};
use crate::util;
use chrono::Utc;
use reqwest::Client;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

/// Legacy MiAuth flow: no PKCE, no token endpoint. The instance records
/// user consent against a session id out-of-band and hands the token out
/// from a check endpoint. The remote protocol validates nothing at check
/// time, so our own protection is the unguessability of the session id
/// plus single-use consumption.
pub struct MiauthFlow {
    client: Client,
    instance_base: String,
    host: String,
    redirect_uri: String,
    permission: String,
}

impl MiauthFlow {
    pub fn new(client: Client, cfg: &Config) -> Self {
        MiauthFlow {
            client,
            instance_base: util::instance_base(cfg),
            host: cfg.host.clone(),
            redirect_uri: util::redirect_uri(cfg),
            permission: cfg.permission.clone(),
        }
    }

    /// Generate a session id, park it, and build the authorization URL
    /// the browser should follow.
    pub async fn start_login(
        &self,
        store: &dyn SessionStore,
        sid: &str,
    ) -> Result<Url, AuthError> {
        let session_id = Uuid::new_v4().to_string();
        let url = build_miauth_url(
            &self.instance_base,
            &session_id,
            &self.redirect_uri,
            &self.permission,
        )
        .map_err(|e| AuthError::Discovery(format!("bad miauth url: {}", e)))?;

        let login = MiauthLogin {
            session_id,
            host: self.host.clone(),
            base: self.instance_base.clone(),
            created_at: Utc::now(),
        };
        store.put_pending(sid, PendingLogin::Miauth(login)).await;
        Ok(url)
    }

    /// Verify the returned session id against the one we issued, then
    /// poll the check endpoint for the token. The pending login is
    /// consumed atomically first, so a session id can never be checked
    /// twice.
    pub async fn check_callback(
        &self,
        store: &dyn SessionStore,
        sid: &str,
        received_session_id: &str,
    ) -> Result<AccessToken, AuthError> {
        let login = match store.take_pending(sid).await {
            Some(PendingLogin::Miauth(login)) => login,
            _ => return Err(AuthError::NoPendingSession),
        };
        if pending_expired(&login.created_at) {
            warn!("pending miauth login expired before the callback arrived");
            return Err(AuthError::NoPendingSession);
        }
        if received_session_id != login.session_id {
            warn!("miauth callback carried an unknown session id; rejecting");
            return Err(AuthError::StateMismatch);
        }

        // The stored record is authoritative for the check call, not
        // whatever base this flow instance was constructed with.
        let url = format!("{}/api/miauth/{}/check", login.base, login.session_id);
        let resp = self.client.post(&url).body("").send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(AuthError::ExchangeFailed {
                status: status.as_u16(),
                body: text,
            });
        }

        let j: serde_json::Value = serde_json::from_str(&text)
            .map_err(|_| AuthError::MalformedResponse(text.clone()))?;
        let token = j
            .get("token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AuthError::MalformedResponse(text.clone()))?;

        let token = AccessToken::new(token);
        store.set_token(sid, token.clone()).await;
        info!("access token issued via miauth for host {}", login.host);
        Ok(token)
    }
}

/// `{base}/miauth/{session}?callback=...&permission=...` with both query
/// values percent-encoded.
pub fn build_miauth_url(
    instance_base: &str,
    session_id: &str,
    callback: &str,
    permission: &str,
) -> Result<Url, url::ParseError> {
    let raw = format!(
        "{}/miauth/{}?callback={}&permission={}",
        instance_base,
        session_id,
        urlencoding::encode(callback),
        urlencoding::encode(permission),
    );
    Url::parse(&raw)
}
