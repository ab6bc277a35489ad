#![allow(clippy::unwrap_used)]
// Integration tests for `KeaClient` using wiremock.

use std::time::Duration;

use serde_json::json;
use url::Url;
use wiremock::matchers::{basic_auth, body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use keafly_api::{Error, KeaClient, KeaCommand, ResponseCode, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, KeaClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = KeaClient::with_client(reqwest::Client::new(), base_url);
    (server, client)
}

// ── Envelope tests ──────────────────────────────────────────────────

#[tokio::test]
async fn test_forwarded_command_returns_per_service_array() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_json(json!({"command": "version-get", "service": ["dhcp4"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "result": 0,
            "text": "2.6.1",
            "arguments": {"extended": "2.6.1 (tarball)"}
        }])))
        .mount(&server)
        .await;

    let responses = client
        .send(&KeaCommand::new("version-get", "dhcp4"))
        .await
        .unwrap();

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].result, ResponseCode::Success);
    assert_eq!(responses[0].text(), "2.6.1");
    assert_eq!(
        responses[0].arguments,
        Some(json!({"extended": "2.6.1 (tarball)"}))
    );
}

#[tokio::test]
async fn test_agent_error_object_is_normalized() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": 1,
            "text": "forwarding socket is not configured for the server type dhcp6"
        })))
        .mount(&server)
        .await;

    let response = client
        .send_one(&KeaCommand::new("config-get", "dhcp6"))
        .await
        .unwrap();
    assert_eq!(response.result, ResponseCode::Error);
    assert!(response.text().contains("forwarding socket"));
}

#[tokio::test]
async fn test_send_checked_surfaces_command_failure() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"result": 2, "text": "'lease4-get-by-state' command not supported."}])),
        )
        .mount(&server)
        .await;

    let err = client
        .send_checked(
            &KeaCommand::new("lease4-get-by-state", "dhcp4").with_arguments(json!({"state": 1})),
        )
        .await
        .unwrap_err();

    assert!(err.is_unsupported(), "expected unsupported, got: {err:?}");
    assert!(
        err.to_string()
            .starts_with("lease4-get-by-state command to dhcp4 failed")
    );
}

#[tokio::test]
async fn test_empty_array_is_missing_response() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let result = client.send_one(&KeaCommand::new("status-get", "dhcp4")).await;
    assert!(
        matches!(result, Err(Error::MissingResponse { .. })),
        "expected MissingResponse, got: {result:?}"
    );
}

// ── Transport tests ─────────────────────────────────────────────────

#[tokio::test]
async fn test_http_error_status() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("agent overloaded"))
        .mount(&server)
        .await;

    let result = client.send(&KeaCommand::new("config-get", "dhcp4")).await;
    match result {
        Err(err @ Error::HttpStatus { status: 503, .. }) => assert!(err.is_transient()),
        other => panic!("expected HttpStatus 503, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not kea</html>"))
        .mount(&server)
        .await;

    let result = client.send(&KeaCommand::new("config-get", "dhcp4")).await;
    assert!(
        matches!(result, Err(Error::Deserialization { .. })),
        "expected Deserialization error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_basic_auth_is_sent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(basic_auth("stork", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"result": 0}])))
        .expect(1)
        .mount(&server)
        .await;

    let transport = TransportConfig::default()
        .with_timeout(Duration::from_secs(2))
        .with_basic_auth("stork", "secret".to_string().into());
    let client = KeaClient::new(Url::parse(&server.uri()).unwrap(), &transport).unwrap();

    let response = client
        .send_one(&KeaCommand::new("config-write", "dhcp4"))
        .await
        .unwrap();
    assert!(response.is_success());
}
