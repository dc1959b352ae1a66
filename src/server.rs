use crate::config::Config;
use crate::fetch::{self, NoteDisplay};
use crate::miauth::MiauthFlow;
use crate::oauth::flow::OauthFlow;
use crate::oauth::AuthError;
use crate::session::{MemorySessionStore, SessionStore};
use crate::util;
use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

const SESSION_COOKIE: &str = "art_explorer_sid";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn SessionStore>,
    pub oauth: Arc<OauthFlow>,
    pub miauth: Arc<MiauthFlow>,
    pub http: reqwest::Client,
    pub instance_base: String,
}

impl AppState {
    pub fn from_config(cfg: Config) -> anyhow::Result<Self> {
        let http = util::http_client(&cfg)?;
        Ok(AppState {
            oauth: Arc::new(OauthFlow::new(http.clone(), &cfg)),
            miauth: Arc::new(MiauthFlow::new(http.clone(), &cfg)),
            store: Arc::new(MemorySessionStore::new()),
            http,
            instance_base: util::instance_base(&cfg),
            config: Arc::new(cfg),
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/login", get(login_handler))
        .route("/logout", get(logout_handler))
        .route("/redirect", get(redirect_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(cfg: Config) -> anyhow::Result<()> {
    let bind_addr = cfg.bind_addr.clone();
    let state = AppState::from_config(cfg)?;
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;
    info!("listening on {}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Extract the opaque browser-session id from the cookie header.
fn session_id(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies
        .split(';')
        .filter_map(|kv| kv.trim().split_once('='))
        .find(|(k, _)| *k == SESSION_COOKIE)
        .map(|(_, v)| v.to_string())
}

/// Existing session id, or a fresh one plus the Set-Cookie value that
/// installs it.
fn ensure_session(headers: &HeaderMap) -> (String, Option<String>) {
    match session_id(headers) {
        Some(sid) => (sid, None),
        None => {
            let sid = Uuid::new_v4().to_string();
            let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, sid);
            (sid, Some(cookie))
        }
    }
}

fn with_cookie(mut resp: Response, cookie: Option<String>) -> Response {
    if let Some(c) = cookie {
        if let Ok(v) = HeaderValue::from_str(&c) {
            resp.headers_mut().insert(header::SET_COOKIE, v);
        }
    }
    resp
}

fn auth_error_response(err: AuthError) -> Response {
    let status = match &err {
        AuthError::NoPendingSession | AuthError::StateMismatch => StatusCode::UNAUTHORIZED,
        AuthError::Network(_) | AuthError::ExchangeFailed { .. } => StatusCode::BAD_GATEWAY,
        AuthError::Discovery(_) | AuthError::MalformedResponse(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error!("login flow failed: {}", err);
    (status, err.to_string()).into_response()
}

async fn index_handler(State(app): State<AppState>, headers: HeaderMap) -> Response {
    let (sid, set_cookie) = ensure_session(&headers);
    match app.store.token(&sid).await {
        None => with_cookie(Html(welcome_page()).into_response(), set_cookie),
        Some(token) => {
            match fetch::fetch_notes(
                &app.http,
                &app.instance_base,
                &token,
                app.config.timeline_limit,
            )
            .await
            {
                Ok(notes) => with_cookie(Html(index_page(&notes)).into_response(), set_cookie),
                Err(e) => {
                    error!("timeline fetch failed: {:#}", e);
                    (StatusCode::BAD_GATEWAY, "timeline fetch failed").into_response()
                }
            }
        }
    }
}

async fn login_handler(State(app): State<AppState>, headers: HeaderMap) -> Response {
    let (sid, set_cookie) = ensure_session(&headers);
    let url = if app.config.flow == "oauth" {
        app.oauth.begin_login(app.store.as_ref(), &sid).await
    } else {
        app.miauth.start_login(app.store.as_ref(), &sid).await
    };
    match url {
        Ok(u) => with_cookie(Html(login_page(u.as_str())).into_response(), set_cookie),
        Err(e) => auth_error_response(e),
    }
}

async fn logout_handler(State(app): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(sid) = session_id(&headers) {
        app.store.clear_token(&sid).await;
        info!("session logged out");
    }
    Redirect::to("/").into_response()
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    session: Option<String>,
}

async fn redirect_handler(
    State(app): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<CallbackQuery>,
) -> Response {
    let Some(sid) = session_id(&headers) else {
        return auth_error_response(AuthError::NoPendingSession);
    };
    let result = if let Some(session) = q.session.as_deref() {
        app.miauth
            .check_callback(app.store.as_ref(), &sid, session)
            .await
    } else if let Some(code) = q.code.as_deref() {
        // A missing state is an empty state: it fails the exact-equality
        // check like any other mismatch.
        app.oauth
            .handle_callback(app.store.as_ref(), &sid, code, q.state.as_deref().unwrap_or(""))
            .await
    } else {
        return (StatusCode::BAD_REQUEST, "missing callback parameters").into_response();
    };
    match result {
        Ok(_token) => Redirect::to("/").into_response(),
        Err(e) => auth_error_response(e),
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn welcome_page() -> String {
    "<!DOCTYPE html><html><body>\
     <h1>art-explorer</h1>\
     <p><a href=\"/login\">Log in with Misskey</a></p>\
     </body></html>"
        .to_string()
}

fn login_page(authorization_url: &str) -> String {
    format!(
        "<!DOCTYPE html><html><body>\
         <h1>art-explorer</h1>\
         <p><a href=\"{0}\">Authorize with your Misskey account</a></p>\
         </body></html>",
        escape_html(authorization_url)
    )
}

fn index_page(notes: &[NoteDisplay]) -> String {
    let mut body = String::from(
        "<!DOCTYPE html><html><body><h1>New artists on your timeline</h1><ul>",
    );
    for note in notes {
        body.push_str(&format!(
            "<li><a href=\"{0}\">{0}</a>",
            escape_html(&note.user_url)
        ));
        for file in &note.files {
            body.push_str(&format!(
                "<br><img src=\"{}\" width=\"320\">",
                escape_html(&file.url)
            ));
        }
        body.push_str("</li>");
    }
    body.push_str("</ul><p><a href=\"/logout\">Log out</a></p></body></html>");
    body
}
