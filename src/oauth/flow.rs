use super::endpoint::{self, EndpointPair};
use super::pkce::Pkce;
use super::AuthError;
use crate::config::Config;
use crate::session::{pending_expired, AccessToken, OauthLogin, PendingLogin, SessionStore};
use crate::util;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

/// Authorization-code-with-PKCE flow against a Misskey instance.
///
/// `begin_login` resolves endpoints, generates PKCE material and a state
/// value, parks them in the session store and returns the authorization
/// URL. `handle_callback` consumes the pending login, verifies the state
/// and exchanges the code for an access token.
pub struct OauthFlow {
    client: Client,
    instance_base: String,
    host: String,
    client_id: String,
    scope: String,
    redirect_uri: String,
    verifier_length: usize,
    fallback: Option<EndpointPair>,
    endpoints: OnceCell<EndpointPair>,
}

impl OauthFlow {
    pub fn new(client: Client, cfg: &Config) -> Self {
        let fallback = match (
            &cfg.fallback_authorization_endpoint,
            &cfg.fallback_token_endpoint,
        ) {
            (Some(auth), Some(token)) => Some(EndpointPair {
                authorization_endpoint: auth.clone(),
                token_endpoint: token.clone(),
            }),
            _ => None,
        };
        OauthFlow {
            client,
            instance_base: util::instance_base(cfg),
            host: cfg.host.clone(),
            client_id: cfg.client_id().to_string(),
            scope: cfg.permission.clone(),
            redirect_uri: util::redirect_uri(cfg),
            verifier_length: cfg.verifier_length,
            fallback,
            endpoints: OnceCell::new(),
        }
    }

    /// Endpoints are discovered at most once per process; a configured
    /// static pair is used when discovery keeps failing.
    pub async fn endpoints(&self) -> Result<&EndpointPair, AuthError> {
        self.endpoints
            .get_or_try_init(|| async {
                let url = endpoint::well_known_url(&self.instance_base);
                match endpoint::discover(&self.client, &url).await {
                    Ok(pair) => Ok(pair),
                    Err(e) => match &self.fallback {
                        Some(pair) => {
                            warn!("discovery failed ({}); using configured fallback endpoints", e);
                            Ok(pair.clone())
                        }
                        None => Err(e),
                    },
                }
            })
            .await
    }

    /// Start a login attempt for the given browser session. Overwrites
    /// any login already pending for it.
    pub async fn begin_login(
        &self,
        store: &dyn SessionStore,
        sid: &str,
    ) -> Result<Url, AuthError> {
        let endpoints = self.endpoints().await?.clone();
        let pkce = Pkce::generate(self.verifier_length);
        let state = Uuid::new_v4().to_string();

        let authorization_url = build_authorization_url(
            &endpoints.authorization_endpoint,
            &self.client_id,
            &self.redirect_uri,
            &self.scope,
            &pkce.challenge,
            &state,
        )
        .map_err(|e| AuthError::Discovery(format!("bad authorization endpoint: {}", e)))?;

        let login = OauthLogin {
            state,
            verifier: pkce.verifier,
            client_id: self.client_id.clone(),
            redirect_uri: self.redirect_uri.clone(),
            scope: self.scope.clone(),
            token_endpoint: endpoints.token_endpoint,
            host: self.host.clone(),
            created_at: Utc::now(),
        };
        store.put_pending(sid, PendingLogin::Oauth(login)).await;

        Ok(authorization_url)
    }

    /// Validate the callback and exchange the code for an access token.
    /// The pending login is consumed up front, so a duplicated callback
    /// finds nothing to replay against.
    pub async fn handle_callback(
        &self,
        store: &dyn SessionStore,
        sid: &str,
        code: &str,
        state: &str,
    ) -> Result<AccessToken, AuthError> {
        let login = match store.take_pending(sid).await {
            Some(PendingLogin::Oauth(login)) => login,
            _ => return Err(AuthError::NoPendingSession),
        };
        if pending_expired(&login.created_at) {
            warn!("pending oauth login expired before the callback arrived");
            return Err(AuthError::NoPendingSession);
        }
        // Sole CSRF defense: exact equality, checked before any network
        // call. An empty received state fails here like any other mismatch.
        if state != login.state {
            warn!("state mismatch on oauth callback; rejecting");
            return Err(AuthError::StateMismatch);
        }

        // The stored verifier goes out as-is; the challenge is never
        // re-derived at this point.
        let body = json!({
            "grant_type": "authorization_code",
            "client_id": login.client_id,
            "redirect_uri": login.redirect_uri,
            "scope": login.scope,
            "code": code,
            "code_verifier": login.verifier,
        });
        let resp = self
            .client
            .post(&login.token_endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(AuthError::ExchangeFailed {
                status: status.as_u16(),
                body: text,
            });
        }

        let token = AccessToken::new(extract_token(&text)?);
        store.set_token(sid, token.clone()).await;
        info!("access token issued via oauth for host {}", login.host);
        Ok(token)
    }
}

/// Compose the authorization redirect. Values are percent-encoded by the
/// query serializer; scopes with `:` and redirect URIs with `/` must
/// round-trip.
pub fn build_authorization_url(
    authorization_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    challenge: &str,
    state: &str,
) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(authorization_endpoint)?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", scope)
        .append_pair("code_challenge", challenge)
        .append_pair("code_challenge_method", "S256")
        .append_pair("state", state);
    Ok(url)
}

/// Providers disagree on the token key: standard OAuth2 responses use
/// `access_token`, Misskey's own use `token`.
fn extract_token(body: &str) -> Result<String, AuthError> {
    let j: serde_json::Value = serde_json::from_str(body)
        .map_err(|_| AuthError::MalformedResponse(body.to_string()))?;
    j.get("access_token")
        .or_else(|| j.get("token"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| AuthError::MalformedResponse(body.to_string()))
}
