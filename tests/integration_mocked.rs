/// Integration tests with a mocked session sidecar
/// Tests the remote gateway protocol without a real browser session
use rust_lead_verifier::errors::PipelineError;
use rust_lead_verifier::gateway_client::{RemoteSessionGateway, SessionFile};
use rust_lead_verifier::session::{
    establish_session, BootstrapPolicy, ChannelCheck, Establishment, SessionGateway, SessionMode,
    SessionStatus, UnknownReason,
};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper function to create a gateway pointed at the mock server
fn create_test_gateway(base_url: &str, session_file: &Path) -> RemoteSessionGateway {
    RemoteSessionGateway::new(
        base_url,
        Some("test_token".to_string()),
        session_file,
        Duration::from_secs(2),
    )
    .unwrap()
}

#[tokio::test]
async fn test_ready_session_is_persisted() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let session_file = dir.path().join("session").join("session.json");

    Mock::given(method("GET"))
        .and(path("/session"))
        .and(header("authorization", "Bearer test_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"state": "ready", "session_id": "sess-1"})),
        )
        .mount(&mock_server)
        .await;

    let mut gateway = create_test_gateway(&mock_server.uri(), &session_file);
    assert_eq!(gateway.ensure_session().await, SessionStatus::Ready);

    let saved: SessionFile =
        serde_json::from_str(&std::fs::read_to_string(&session_file).unwrap()).unwrap();
    assert_eq!(saved.session_id, "sess-1");
}

#[tokio::test]
async fn test_saved_session_is_sent_on_reuse() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let session_file = dir.path().join("session.json");
    std::fs::write(
        &session_file,
        r#"{"session_id": "sess-saved", "established_at": "2026-01-01T00:00:00Z"}"#,
    )
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/session"))
        .and(header("X-Session-Id", "sess-saved"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "ready"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut gateway = create_test_gateway(&mock_server.uri(), &session_file);
    let established = establish_session(
        &mut gateway,
        SessionMode::Unattended,
        BootstrapPolicy::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(established, Establishment::Ready);
}

#[tokio::test]
async fn test_unattended_without_session_fails_fast() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/session"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "needs_bootstrap"})),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/session/bootstrap"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut gateway = create_test_gateway(&mock_server.uri(), &dir.path().join("session.json"));
    let err = establish_session(
        &mut gateway,
        SessionMode::Unattended,
        BootstrapPolicy::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PipelineError::SessionBootstrap(_)));
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_attended_bootstrap_completes() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let session_file = dir.path().join("session.json");

    // Once the bootstrap id is known, the sidecar reports the session ready.
    Mock::given(method("GET"))
        .and(path("/session"))
        .and(header("X-Session-Id", "sess-new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "ready"})))
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/session"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "needs_bootstrap"})),
        )
        .with_priority(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/session/bootstrap"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "session_id": "sess-new",
            "prompt": "scan the QR code in the sidecar console",
            "expires_in": 180
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut gateway = create_test_gateway(&mock_server.uri(), &session_file);
    let policy = BootstrapPolicy {
        timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(10),
    };
    let established =
        establish_session(&mut gateway, SessionMode::Attended, policy, &CancellationToken::new())
            .await
            .unwrap();

    assert_eq!(established, Establishment::Ready);
    assert!(session_file.exists());
}

#[tokio::test]
async fn test_cancelled_bootstrap_stops_polling() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/session"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "needs_bootstrap"})),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/session/bootstrap"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "session_id": "sess-never",
            "prompt": "scan the QR code in the sidecar console",
            "expires_in": 180
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut gateway = create_test_gateway(&mock_server.uri(), &dir.path().join("session.json"));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let policy = BootstrapPolicy {
        timeout: Duration::from_secs(60),
        poll_interval: Duration::from_millis(10),
    };
    let started = std::time::Instant::now();
    let established = establish_session(&mut gateway, SessionMode::Attended, policy, &cancel)
        .await
        .unwrap();

    assert_eq!(established, Establishment::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_channel_check_outcomes() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/contacts/525511112222/channel"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "has_channel"})),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/contacts/525533334444/channel"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "no_channel"})),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/contacts/525555556666/channel"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "maybe"})))
        .mount(&mock_server)
        .await;

    let mut gateway = create_test_gateway(&mock_server.uri(), &dir.path().join("session.json"));

    assert_eq!(gateway.check("+525511112222").await, ChannelCheck::HasChannel);
    assert_eq!(gateway.check("+525533334444").await, ChannelCheck::NoChannel);
    assert!(matches!(
        gateway.check("+525555556666").await,
        ChannelCheck::Unknown(UnknownReason::UnexpectedResponse(_))
    ));
}

#[tokio::test]
async fn test_rejected_session_is_inconclusive() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/contacts/525511112222/channel"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/contacts/525533334444/channel"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let mut gateway = create_test_gateway(&mock_server.uri(), &dir.path().join("session.json"));

    assert_eq!(
        gateway.check("+525511112222").await,
        ChannelCheck::Unknown(UnknownReason::SessionUnavailable)
    );
    assert!(matches!(
        gateway.check("+525533334444").await,
        ChannelCheck::Unknown(UnknownReason::UnexpectedResponse(_))
    ));
}

#[tokio::test]
async fn test_slow_sidecar_times_out_as_unknown() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/contacts/525511112222/channel"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"status": "has_channel"}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock_server)
        .await;

    let mut gateway = create_test_gateway(&mock_server.uri(), &dir.path().join("session.json"));

    assert_eq!(
        gateway.check("+525511112222").await,
        ChannelCheck::Unknown(UnknownReason::Timeout)
    );
}

#[tokio::test]
async fn test_unreachable_sidecar_fails_session_probe() {
    let dir = tempfile::tempdir().unwrap();
    let mut gateway = create_test_gateway("http://127.0.0.1:1", &dir.path().join("session.json"));

    assert!(matches!(
        gateway.ensure_session().await,
        SessionStatus::Failed(_)
    ));
    assert!(matches!(
        gateway.check("+525511112222").await,
        ChannelCheck::Unknown(UnknownReason::Transport(_))
    ));
}
