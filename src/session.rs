use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Pending logins older than this are treated as gone, bounding the
/// window in which a stale callback can still be answered.
pub const PENDING_MAX_AGE_SECS: i64 = 600;

pub fn pending_expired(created_at: &DateTime<Utc>) -> bool {
    (Utc::now() - *created_at).num_seconds() > PENDING_MAX_AGE_SECS
}

/// Opaque credential for the remote API. `Debug` is redacted so the raw
/// value never lands in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(s: impl Into<String>) -> Self {
        AccessToken(s.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

/// Everything the oauth callback needs to validate and complete the
/// exchange, bound to one browser session and one login attempt.
#[derive(Debug, Clone)]
pub struct OauthLogin {
    pub state: String,
    pub verifier: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub token_endpoint: String,
    pub host: String,
    pub created_at: DateTime<Utc>,
}

/// Pending MiAuth attempt. The session id is the only secret in this
/// flow, so it is single-use by construction (`take_pending`). `base`
/// is the instance base URL the check call goes to; the callback uses
/// the stored record, never flow state resolved later.
#[derive(Debug, Clone)]
pub struct MiauthLogin {
    pub session_id: String,
    pub host: String,
    pub base: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum PendingLogin {
    Oauth(OauthLogin),
    Miauth(MiauthLogin),
}

impl PendingLogin {
    pub fn created_at(&self) -> &DateTime<Utc> {
        match self {
            PendingLogin::Oauth(login) => &login.created_at,
            PendingLogin::Miauth(login) => &login.created_at,
        }
    }
}

/// Per-browser-session state, injected into handlers. Implementations
/// must isolate sessions from each other and make `take_pending` atomic
/// (at most one caller observes a given pending login).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Park a pending login, replacing any previous one for the same
    /// session. Only one attempt may be pending at a time.
    async fn put_pending(&self, sid: &str, login: PendingLogin);

    /// Remove and return the pending login, if any.
    async fn take_pending(&self, sid: &str) -> Option<PendingLogin>;

    async fn set_token(&self, sid: &str, token: AccessToken);

    async fn token(&self, sid: &str) -> Option<AccessToken>;

    async fn clear_token(&self, sid: &str);
}

#[derive(Default)]
struct Entry {
    pending: Option<PendingLogin>,
    token: Option<AccessToken>,
}

/// In-memory store. Sessions live as long as the process; good enough
/// for a single-instance deployment.
#[derive(Default)]
pub struct MemorySessionStore {
    inner: Mutex<HashMap<String, Entry>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn entry_is_empty(map: &HashMap<String, Entry>, sid: &str) -> bool {
    map.get(sid)
        .map_or(false, |e| e.pending.is_none() && e.token.is_none())
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put_pending(&self, sid: &str, login: PendingLogin) {
        let mut map = self.inner.lock().await;
        // Sweep expired pendings: a client minting fresh cookie values
        // must not grow the map without bound.
        map.retain(|_, e| {
            e.token.is_some()
                || e.pending
                    .as_ref()
                    .map_or(false, |p| !pending_expired(p.created_at()))
        });
        map.entry(sid.to_string()).or_default().pending = Some(login);
    }

    async fn take_pending(&self, sid: &str) -> Option<PendingLogin> {
        let mut map = self.inner.lock().await;
        let login = map.get_mut(sid).and_then(|e| e.pending.take());
        if entry_is_empty(&map, sid) {
            map.remove(sid);
        }
        login
    }

    async fn set_token(&self, sid: &str, token: AccessToken) {
        let mut map = self.inner.lock().await;
        map.entry(sid.to_string()).or_default().token = Some(token);
    }

    async fn token(&self, sid: &str) -> Option<AccessToken> {
        let map = self.inner.lock().await;
        map.get(sid).and_then(|e| e.token.clone())
    }

    async fn clear_token(&self, sid: &str) {
        let mut map = self.inner.lock().await;
        if let Some(e) = map.get_mut(sid) {
            e.token = None;
        }
        if entry_is_empty(&map, sid) {
            map.remove(sid);
        }
    }
}
