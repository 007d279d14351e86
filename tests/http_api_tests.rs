use std::sync::Arc;
use std::time::Duration;

use scan_client_rs::api::{HttpScanApi, ScanApi};
use scan_client_rs::error::{ApiError, ManagerError, SubmitError};
use scan_client_rs::types::{StartScanRequest, VulnerabilityKind};
use scan_client_rs::{ChannelSink, ClientConfig, PollPolicy, ScanManager, ScanStatus, TaskId};
use serde_json::json;
use wiremock::{
    matchers::{body_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn api_for(server: &MockServer) -> HttpScanApi {
    let config = ClientConfig {
        base_url: server.uri(),
        ..ClientConfig::default()
    };
    HttpScanApi::new(&config).unwrap()
}

#[tokio::test]
async fn start_scan_posts_target_and_scan_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/scan"))
        .and(body_json(json!({ "target": "10.0.0.5", "scan_type": "full" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "status": "started", "task_id": 17 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let reply = api_for(&server)
        .start_scan(&StartScanRequest {
            target: "10.0.0.5".into(),
            scan_type: Some("full".into()),
        })
        .await
        .unwrap();
    assert_eq!(reply.status, "started");
    assert_eq!(reply.task_id, Some(TaskId::new("17")));
}

#[tokio::test]
async fn start_scan_non_success_is_an_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/scan"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let err = api_for(&server)
        .start_scan(&StartScanRequest {
            target: "10.0.0.5".into(),
            scan_type: None,
        })
        .await
        .unwrap_err();
    match err {
        ApiError::HttpStatus { status, body, .. } => {
            assert_eq!(status, 500);
            assert_eq!(body, "Internal Server Error");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn status_error_payload_decodes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scan-status/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "abc",
            "status": "error",
            "message": "target unreachable"
        })))
        .mount(&server)
        .await;

    let reply = api_for(&server).get_status(&TaskId::new("abc")).await.unwrap();
    assert!(reply.is_error());
    assert_eq!(reply.message.as_deref(), Some("target unreachable"));
}

#[tokio::test]
async fn malformed_status_payload_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scan-status/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = api_for(&server).get_status(&TaskId::new("abc")).await.unwrap_err();
    assert!(matches!(err, ApiError::Decode { .. }));
}

#[tokio::test]
async fn results_and_stop_payloads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scan-results/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "vulnerabilities": [{ "name": "X", "severity": "High" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/stop-scan/abc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "message": "Scan stopped" })),
        )
        .mount(&server)
        .await;

    let api = api_for(&server);
    let results = api.get_results(&TaskId::new("abc")).await.unwrap();
    assert!(results.is_completed());
    assert_eq!(results.vulnerabilities[0].identifier, "X");
    assert_eq!(results.vulnerabilities[0].kind, VulnerabilityKind::Named);

    let stop = api.stop_scan(&TaskId::new("abc")).await.unwrap();
    assert_eq!(stop.message, "Scan stopped");
}

#[tokio::test]
async fn debug_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/test-connection"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "error", "message": "Authentication failed" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "message": "Backend is running!" })),
        )
        .mount(&server)
        .await;

    let api = api_for(&server);
    let conn = api.test_connection().await.unwrap();
    assert!(!conn.is_success());
    assert_eq!(conn.message.as_deref(), Some("Authentication failed"));
    assert_eq!(api.health().await.unwrap().message, "Backend is running!");
}

#[tokio::test]
async fn stop_and_health_reject_non_success_replies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stop-scan/abc"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "detail": "Not Found" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "down" })))
        .mount(&server)
        .await;

    let api = api_for(&server);
    let err = api.stop_scan(&TaskId::new("abc")).await.unwrap_err();
    assert!(matches!(err, ApiError::HttpStatus { status: 404, .. }));
    let err = api.health().await.unwrap_err();
    assert!(matches!(err, ApiError::HttpStatus { status: 500, .. }));
}

#[tokio::test]
async fn manager_reports_missing_stop_route_as_stop_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/scan"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "status": "started", "task_id": "abc" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/stop-scan/abc"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "detail": "Not Found" })))
        .expect(1)
        .mount(&server)
        .await;

    let (sink, _rx) = ChannelSink::new();
    let manager = ScanManager::new(Arc::new(api_for(&server)), Arc::new(sink), PollPolicy::default())
        .unwrap();
    let handle = manager.submit("10.0.0.5", None).await.unwrap();

    let err = manager.stop(&handle).await.unwrap_err();
    match err {
        ManagerError::Stop { task_id, source } => {
            assert_eq!(task_id.as_str(), "abc");
            assert!(matches!(source, ApiError::HttpStatus { status: 404, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    let session = manager.snapshot(&handle).await.unwrap();
    assert_eq!(session.status, ScanStatus::Stopped);
    assert!(session.message.unwrap().starts_with("error stopping scan"));
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    // Nothing listens on the discard port.
    let config = ClientConfig {
        base_url: "http://127.0.0.1:9".into(),
        request_timeout: Duration::from_secs(2),
        ..ClientConfig::default()
    };
    let api = HttpScanApi::new(&config).unwrap();
    let err = api.health().await.unwrap_err();
    assert!(matches!(err, ApiError::Transport { .. }));
}

#[tokio::test]
async fn manager_surfaces_http_rejection_as_submit_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/scan"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let (sink, _rx) = ChannelSink::new();
    let manager = ScanManager::new(Arc::new(api_for(&server)), Arc::new(sink), PollPolicy::default())
            .unwrap();
    let err = manager.submit("10.0.0.5", None).await.unwrap_err();
    assert!(matches!(err, SubmitError::Api(ApiError::HttpStatus { status: 503, .. })));
    assert!(err.to_string().starts_with("Failed to start scan"));
    assert!(manager.sessions().await.is_empty());
}

#[tokio::test]
async fn manager_polls_real_http_until_done() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/scan"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "status": "queued", "task_id": "abc" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/scan-status/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "Done" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/scan-results/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "result": [{ "cve": "CVE-2023-1234", "desc": "Example Vulnerability" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (sink, _rx) = ChannelSink::new();
    let policy = PollPolicy {
        interval: Duration::from_millis(20),
        max_attempts: 5,
    };
    let manager = ScanManager::new(Arc::new(api_for(&server)), Arc::new(sink), policy).unwrap();
    let handle = manager.submit("10.0.0.5", None).await.unwrap();
    let session = tokio::time::timeout(Duration::from_secs(5), manager.wait(&handle))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(session.status, ScanStatus::Done);
    let vulns = session.vulnerabilities.unwrap();
    assert_eq!(vulns[0].identifier, "CVE-2023-1234");
    assert_eq!(vulns[0].kind, VulnerabilityKind::Cve);
}
