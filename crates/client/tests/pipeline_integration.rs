//! End-to-end pipeline tests against a mock platform
//!
//! Exercises the executor the way the CLI layer drives it: success path,
//! cache short-circuit, retry bounds, rate-limit honoring, and terminal
//! classification, all against wiremock.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use aegis_client::{ApiExecutor, ClientConfig, Credential, ExecuteOptions, MemoryCredentialStore};
use aegis_common::error::ErrorCategory;
use aegis_common::security::SecureString;
use reqwest::Method;
use serde_json::json;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn seeded_store() -> Arc<MemoryCredentialStore> {
    Arc::new(MemoryCredentialStore::with_credential(Credential {
        identity: "analyst@example.com".to_string(),
        api_key: SecureString::from("signing-key-0123456789abcdef"),
        api_url: None,
    }))
}

fn test_config(server: &MockServer) -> ClientConfig {
    ClientConfig::builder()
        .base_url(server.uri())
        .allow_http(true)
        .retry_interval(Duration::from_millis(10))
        .build()
}

fn executor_for(server: &MockServer) -> ApiExecutor<MemoryCredentialStore> {
    ApiExecutor::new(test_config(server), seeded_store()).expect("executor")
}

#[tokio::test]
async fn success_path_returns_parsed_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/assets"))
        .and(header_exists("authorization"))
        .and(header_exists("x-correlation-id"))
        .and(header_exists("x-request-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "a1"})))
        .expect(1)
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let payload = executor.execute("/assets", Method::GET, None, None).await.unwrap();

    assert_eq!(payload, Some(json!({"id": "a1"})));
}

#[tokio::test]
async fn cache_short_circuits_second_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/assets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "a1"})))
        .expect(1)
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let options = ExecuteOptions::from_config(&test_config(&server)).with_cache();

    let first = executor
        .execute_with("/assets", Method::GET, None, None, options.clone())
        .await
        .unwrap();
    let second = executor
        .execute_with("/assets", Method::GET, None, None, options)
        .await
        .unwrap();

    assert_eq!(first, second);
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn persistent_server_errors_exhaust_retry_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/assets"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let record = executor.execute("/assets", Method::GET, None, None).await.unwrap_err();

    assert_eq!(record.category, ErrorCategory::Connection);
    // retry_count = 3 means exactly 4 sends
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 4);
}

#[tokio::test]
async fn rate_limit_waits_retry_after_then_fails_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/scans"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .expect(2)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let executor = executor_for(&server);
    let mut options = ExecuteOptions::from_config(&config);
    options.retry_count = 1;

    let started = Instant::now();
    let record = executor
        .execute_with("/scans", Method::GET, None, None, options)
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(record.category, ErrorCategory::LimitExceeded);
    assert!(elapsed >= Duration::from_secs(2), "paused only {elapsed:?}");
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
}

#[tokio::test]
async fn not_found_is_terminal_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/assets/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such asset"))
        .expect(1)
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let record =
        executor.execute("/assets/missing", Method::GET, None, None).await.unwrap_err();

    assert_eq!(record.category, ErrorCategory::ResourceNotFound);
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn post_sends_serialized_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/scans"))
        .and(wiremock::matchers::body_json(json!({"name": "scan-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accepted": true})))
        .expect(1)
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let body = json!({"name": "scan-1", "notes": null});
    let payload =
        executor.execute("/scans", Method::POST, Some(&body), None).await.unwrap();

    assert_eq!(payload, Some(json!({"accepted": true})));
}

#[tokio::test]
async fn query_parameters_reach_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/assets"))
        .and(wiremock::matchers::query_param("severity", "high"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let mut params = BTreeMap::new();
    params.insert("severity".to_string(), "high".to_string());

    let payload =
        executor.execute("/assets", Method::GET, None, Some(&params)).await.unwrap();

    assert_eq!(payload, Some(json!([])));
}

#[tokio::test]
async fn missing_credential_surfaces_authentication_record() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryCredentialStore::new());
    let executor = ApiExecutor::new(test_config(&server), store).unwrap();

    let record = executor.execute("/assets", Method::GET, None, None).await.unwrap_err();

    assert_eq!(record.category, ErrorCategory::Authentication);
    // No request should have left the process without a token
    let requests = server.received_requests().await.unwrap();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn supplied_correlation_id_survives_into_error_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/assets"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let options = ExecuteOptions::from_config(&test_config(&server)).correlation_id("cid-77");

    let record = executor
        .execute_with("/assets", Method::GET, None, None, options)
        .await
        .unwrap_err();

    assert_eq!(record.category, ErrorCategory::Validation);
    assert_eq!(record.correlation_id, "cid-77");
    assert_eq!(record.details.get("endpoint").map(String::as_str), Some("/assets"));
}

#[tokio::test]
async fn typed_execute_deserializes_payload() {
    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct Asset {
        id: String,
        severity: String,
    }

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/assets/a1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "a1", "severity": "high"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let asset: Option<Asset> =
        executor.execute_typed("/assets/a1", Method::GET, None, None).await.unwrap();

    assert_eq!(
        asset,
        Some(Asset { id: "a1".to_string(), severity: "high".to_string() })
    );
}

#[tokio::test]
async fn health_check_reports_platform_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    assert!(executor.health_check().await.unwrap());
}

#[tokio::test]
async fn health_check_unhealthy_is_false_not_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    assert!(!executor.health_check().await.unwrap());
}
