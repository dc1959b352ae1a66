use art_explorer::oauth::{endpoint, AuthError};
use mockito::Server;
use serde_json::json;

const WELL_KNOWN: &str = "/.well-known/oauth-authorization-server";

#[test]
fn discovers_endpoint_pair() {
    let mut server = Server::new();
    let base = server.url();
    let _m = server
        .mock("GET", WELL_KNOWN)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "authorization_endpoint": format!("{}/oauth/authorize", base),
                "token_endpoint": format!("{}/oauth/token", base),
            })
            .to_string(),
        )
        .create();

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async move {
        let client = reqwest::Client::new();
        let pair = endpoint::discover(&client, &endpoint::well_known_url(&base))
            .await
            .unwrap();
        assert_eq!(pair.authorization_endpoint, format!("{}/oauth/authorize", base));
        assert_eq!(pair.token_endpoint, format!("{}/oauth/token", base));
    });
}

#[test]
fn empty_required_field_is_a_discovery_error() {
    let mut server = Server::new();
    let base = server.url();
    let _m = server
        .mock("GET", WELL_KNOWN)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "authorization_endpoint": "https://example.com/authorize",
                "token_endpoint": "",
            })
            .to_string(),
        )
        .expect_at_least(1)
        .create();

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async move {
        let client = reqwest::Client::new();
        let err = endpoint::discover(&client, &endpoint::well_known_url(&base))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Discovery(_)));
    });
}

#[test]
fn non_json_body_is_a_discovery_error() {
    let mut server = Server::new();
    let base = server.url();
    let _m = server
        .mock("GET", WELL_KNOWN)
        .with_status(200)
        .with_body("<html>not a discovery document</html>")
        .expect_at_least(1)
        .create();

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async move {
        let client = reqwest::Client::new();
        let err = endpoint::discover(&client, &endpoint::well_known_url(&base))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Discovery(_)));
    });
}

#[test]
fn failing_document_is_retried_before_giving_up() {
    let mut server = Server::new();
    let base = server.url();
    let m = server
        .mock("GET", WELL_KNOWN)
        .with_status(500)
        .expect(3)
        .create();

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async move {
        let client = reqwest::Client::new();
        let err = endpoint::discover(&client, &endpoint::well_known_url(&base))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Discovery(_)));
    });
    m.assert();
}
