use art_explorer::config::Config;
use art_explorer::miauth::{build_miauth_url, MiauthFlow};
use art_explorer::oauth::AuthError;
use art_explorer::session::{MemorySessionStore, MiauthLogin, PendingLogin, SessionStore};
use chrono::{Duration, Utc};
use mockito::{Matcher, Server};
use serde_json::json;

fn test_config(instance_base: &str) -> Config {
    Config {
        flow: "miauth".into(),
        host: "misskey.example".into(),
        instance_base: Some(instance_base.to_string()),
        public_base_url: "http://localhost:8080".into(),
        ..Config::default()
    }
}

#[tokio::test]
async fn start_login_builds_url_with_session_id_and_encoded_callback() {
    let cfg = test_config("https://misskey.example");
    let store = MemorySessionStore::new();
    let flow = MiauthFlow::new(reqwest::Client::new(), &cfg);

    let url = flow.start_login(&store, "sid-1").await.unwrap();

    let login = match store.take_pending("sid-1").await.unwrap() {
        PendingLogin::Miauth(login) => login,
        other => panic!("unexpected pending login: {:?}", other),
    };
    assert_eq!(url.path(), format!("/miauth/{}", login.session_id));
    let s = url.as_str();
    assert!(s.contains("callback=http%3A%2F%2Flocalhost%3A8080%2Fredirect"));
    assert!(s.contains("permission=read%3Aaccount"));
    assert_eq!(login.host, "misskey.example");
}

#[test]
fn check_callback_issues_token_exactly_once() {
    let mut server = Server::new();
    let base = server.url();

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async move {
        let cfg = test_config(&base);
        let store = MemorySessionStore::new();
        let flow = MiauthFlow::new(reqwest::Client::new(), &cfg);

        flow.start_login(&store, "sid-1").await.unwrap();
        let login = match store.take_pending("sid-1").await.unwrap() {
            PendingLogin::Miauth(login) => login,
            other => panic!("unexpected pending login: {:?}", other),
        };
        let session_id = login.session_id.clone();
        store.put_pending("sid-1", PendingLogin::Miauth(login)).await;

        let m_check = server
            .mock("POST", format!("/api/miauth/{}/check", session_id).as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "token": "tok-1", "user": { "id": "u1" } }).to_string())
            .create();

        let token = flow
            .check_callback(&store, "sid-1", &session_id)
            .await
            .unwrap();
        assert_eq!(token.secret(), "tok-1");
        assert_eq!(store.token("sid-1").await.unwrap().secret(), "tok-1");
        m_check.assert();

        // The session id is single-use: a second check finds nothing.
        let err = flow
            .check_callback(&store, "sid-1", &session_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoPendingSession));
    });
}

#[test]
fn unknown_session_id_fails_closed_without_network() {
    let mut server = Server::new();
    let base = server.url();
    let m_check = server
        .mock("POST", Matcher::Regex(r"^/api/miauth/.*/check$".to_string()))
        .expect(0)
        .create();

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async move {
        let cfg = test_config(&base);
        let store = MemorySessionStore::new();
        let flow = MiauthFlow::new(reqwest::Client::new(), &cfg);

        flow.start_login(&store, "sid-1").await.unwrap();
        let err = flow
            .check_callback(&store, "sid-1", "not-the-issued-id")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));
    });
    m_check.assert();
}

#[test]
fn failed_check_surfaces_status_and_body() {
    let mut server = Server::new();
    let base = server.url();
    let _m_check = server
        .mock("POST", Matcher::Regex(r"^/api/miauth/.*/check$".to_string()))
        .with_status(400)
        .with_body(json!({ "error": "pending" }).to_string())
        .create();

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async move {
        let cfg = test_config(&base);
        let store = MemorySessionStore::new();
        let flow = MiauthFlow::new(reqwest::Client::new(), &cfg);

        flow.start_login(&store, "sid-1").await.unwrap();
        let login = match store.take_pending("sid-1").await.unwrap() {
            PendingLogin::Miauth(login) => login,
            other => panic!("unexpected pending login: {:?}", other),
        };
        let session_id = login.session_id.clone();
        store.put_pending("sid-1", PendingLogin::Miauth(login)).await;

        let err = flow
            .check_callback(&store, "sid-1", &session_id)
            .await
            .unwrap_err();
        match err {
            AuthError::ExchangeFailed { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("pending"));
            }
            other => panic!("expected ExchangeFailed, got {:?}", other),
        }
    });
}

#[test]
fn check_response_without_token_field_is_malformed() {
    let mut server = Server::new();
    let base = server.url();
    let _m_check = server
        .mock("POST", Matcher::Regex(r"^/api/miauth/.*/check$".to_string()))
        .with_status(200)
        .with_body(json!({ "ok": true }).to_string())
        .create();

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async move {
        let cfg = test_config(&base);
        let store = MemorySessionStore::new();
        let flow = MiauthFlow::new(reqwest::Client::new(), &cfg);

        flow.start_login(&store, "sid-1").await.unwrap();
        let login = match store.take_pending("sid-1").await.unwrap() {
            PendingLogin::Miauth(login) => login,
            other => panic!("unexpected pending login: {:?}", other),
        };
        let session_id = login.session_id.clone();
        store.put_pending("sid-1", PendingLogin::Miauth(login)).await;

        let err = flow
            .check_callback(&store, "sid-1", &session_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MalformedResponse(_)));
    });
}

#[test]
fn expired_pending_login_is_rejected_before_check() {
    let mut server = Server::new();
    let base = server.url();
    let m_check = server
        .mock("POST", Matcher::Regex(r"^/api/miauth/.*/check$".to_string()))
        .expect(0)
        .create();

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async move {
        let cfg = test_config(&base);
        let store = MemorySessionStore::new();
        let flow = MiauthFlow::new(reqwest::Client::new(), &cfg);

        let stale = MiauthLogin {
            session_id: "mi-stale".into(),
            host: "misskey.example".into(),
            base: base.clone(),
            created_at: Utc::now() - Duration::minutes(11),
        };
        store.put_pending("sid-1", PendingLogin::Miauth(stale)).await;

        let err = flow
            .check_callback(&store, "sid-1", "mi-stale")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoPendingSession));
    });
    m_check.assert();
}

#[test]
fn check_call_targets_the_stored_instance_base() {
    let mut server = Server::new();
    let base = server.url();
    let m_check = server
        .mock("POST", "/api/miauth/mi-stored/check")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "token": "tok-stored" }).to_string())
        .create();

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async move {
        // The flow instance points at an unreachable base; the call must
        // go to the base captured in the pending record instead.
        let cfg = test_config("http://127.0.0.1:1");
        let store = MemorySessionStore::new();
        let flow = MiauthFlow::new(reqwest::Client::new(), &cfg);

        let login = MiauthLogin {
            session_id: "mi-stored".into(),
            host: "misskey.example".into(),
            base: base.clone(),
            created_at: Utc::now(),
        };
        store.put_pending("sid-1", PendingLogin::Miauth(login)).await;

        let token = flow
            .check_callback(&store, "sid-1", "mi-stored")
            .await
            .unwrap();
        assert_eq!(token.secret(), "tok-stored");
    });
    m_check.assert();
}

#[test]
fn miauth_url_shape_is_stable() {
    let url = build_miauth_url(
        "https://misskey.io",
        "11111111-2222-3333-4444-555555555555",
        "https://app.example/redirect",
        "read:account",
    )
    .unwrap();
    assert_eq!(
        url.as_str(),
        "https://misskey.io/miauth/11111111-2222-3333-4444-555555555555\
         ?callback=https%3A%2F%2Fapp.example%2Fredirect&permission=read%3Aaccount"
    );
}
