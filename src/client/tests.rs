//! Tests for the retrying request engine

use super::{ClientConfig, RequestOptions, X402Client};
use crate::error::BoxError;
use crate::executor::PaymentExecutor;
use crate::types::{headers, Currency, PaymentRequirement};
use crate::X402Error;
use async_trait::async_trait;
use chrono::Utc;
use mockito::{Matcher, Server, ServerGuard};
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Executor that records how often it was asked to pay
struct RecordingExecutor {
    calls: AtomicUsize,
    signature: String,
}

impl RecordingExecutor {
    fn new(signature: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            signature: signature.to_string(),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentExecutor for RecordingExecutor {
    async fn execute(&self, _requirement: &PaymentRequirement) -> Result<String, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.signature.clone())
    }
}

struct LockedWallet;

#[async_trait]
impl PaymentExecutor for LockedWallet {
    async fn execute(&self, _requirement: &PaymentRequirement) -> Result<String, BoxError> {
        Err("wallet locked".into())
    }
}

fn test_config() -> ClientConfig {
    ClientConfig::new().with_retry_delay(Duration::from_millis(10))
}

fn test_client(executor: Arc<RecordingExecutor>) -> X402Client {
    X402Client::new(test_config()).unwrap().with_executor(executor)
}

fn expires_in(secs: i64) -> String {
    (Utc::now().timestamp() + secs).to_string()
}

async fn mock_challenge(
    server: &mut ServerGuard,
    amount: &str,
    expires: &str,
    hits: usize,
) -> mockito::Mock {
    server
        .mock("GET", "/premium")
        .match_header(headers::PAYMENT_SIGNATURE, Matcher::Missing)
        .with_status(402)
        .with_header(headers::VERSION, "1.0")
        .with_header(headers::AMOUNT, amount)
        .with_header(headers::CURRENCY, "SOL")
        .with_header(headers::RECIPIENT, "R1")
        .with_header(headers::REFERENCE, "pay_abc")
        .with_header(headers::EXPIRES, expires)
        .with_body(json!({"error": "Payment Required", "code": "PAYMENT_REQUIRED"}).to_string())
        .expect(hits)
        .create_async()
        .await
}

async fn mock_paid(server: &mut ServerGuard, signature: &str, hits: usize) -> mockito::Mock {
    server
        .mock("GET", "/premium")
        .match_header(headers::PAYMENT_SIGNATURE, signature)
        .match_header(headers::PAYMENT_REFERENCE, "pay_abc")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"content": "premium"}).to_string())
        .expect(hits)
        .create_async()
        .await
}

const OK_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\n\
content-type: application/json\r\n\
content-length: 11\r\n\
connection: close\r\n\r\n\
{\"ok\":true}";

/// Server that drops its first `failures` connections and answers the rest
async fn flaky_server(failures: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            if counter.fetch_add(1, Ordering::SeqCst) < failures {
                drop(socket);
                continue;
            }
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(OK_RESPONSE).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}/resource", addr), connections)
}

/// Server that accepts connections and never answers
async fn silent_server() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(socket);
        }
    });

    (format!("http://{}/slow", addr), connections)
}

/// Server that answers its first connection with a 402 challenge and drops
/// every later one
async fn challenge_then_drop_server() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();
    let challenge = format!(
        "HTTP/1.1 402 Payment Required\r\n\
{}: 1.0\r\n{}: 0.05\r\n{}: SOL\r\n{}: R1\r\n{}: pay_abc\r\n{}: {}\r\n\
content-length: 0\r\nconnection: close\r\n\r\n",
        headers::VERSION,
        headers::AMOUNT,
        headers::CURRENCY,
        headers::RECIPIENT,
        headers::REFERENCE,
        headers::EXPIRES,
        expires_in(600)
    );

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            if counter.fetch_add(1, Ordering::SeqCst) > 0 {
                drop(socket);
                continue;
            }
            let challenge = challenge.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(challenge.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}/premium", addr), connections)
}

#[tokio::test]
async fn test_plain_success_has_no_payment() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/free")
        .match_header("authorization", "Bearer key-1")
        .match_header(headers::SDK_VERSION, Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("x-request-id", "req-7")
        .with_body(json!({"hello": "world"}).to_string())
        .create_async()
        .await;

    let client = X402Client::new(test_config().with_api_key("key-1")).unwrap();
    let response = client
        .get(&format!("{}/free", server.url()))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.status, 200);
    assert_eq!(response.data, Some(json!({"hello": "world"})));
    assert_eq!(response.headers.get("x-request-id").unwrap(), "req-7");
    assert!(response.payment_made.is_none());
}

#[tokio::test]
async fn test_empty_and_non_json_bodies() {
    let mut server = Server::new_async().await;
    let _empty = server
        .mock("DELETE", "/empty")
        .with_status(204)
        .create_async()
        .await;
    let _text = server
        .mock("GET", "/text")
        .with_status(200)
        .with_body("plain text")
        .create_async()
        .await;

    let client = X402Client::new(test_config()).unwrap();
    let empty = client
        .execute(
            &format!("{}/empty", server.url()),
            RequestOptions::get().with_method(http::Method::DELETE),
        )
        .await
        .unwrap();
    assert_eq!(empty.status, 204);
    assert_eq!(empty.data, None);

    let text = client.get(&format!("{}/text", server.url())).await.unwrap();
    assert_eq!(text.data, Some(json!("plain text")));
}

#[tokio::test]
async fn test_challenge_is_paid_and_retried() {
    let mut server = Server::new_async().await;
    let challenge = mock_challenge(&mut server, "0.05", &expires_in(600), 1).await;
    let paid = mock_paid(&mut server, "sig_123", 1).await;

    let executor = RecordingExecutor::new("sig_123");
    let client = test_client(executor.clone());

    let response = client
        .get(&format!("{}/premium", server.url()))
        .await
        .unwrap();

    challenge.assert_async().await;
    paid.assert_async().await;
    assert_eq!(executor.calls(), 1);
    assert_eq!(response.status, 200);
    assert_eq!(response.data, Some(json!({"content": "premium"})));

    let payment = response.payment_made.unwrap();
    assert_eq!(payment.amount, Decimal::from_str("0.05").unwrap());
    assert_eq!(payment.currency, Currency::Native);
    assert_eq!(payment.signature, "sig_123");
}

#[tokio::test]
async fn test_paid_retry_resends_body() {
    let mut server = Server::new_async().await;
    let body = json!({"prompt": "tell me a joke"});
    let _challenge = server
        .mock("POST", "/generate")
        .match_header(headers::PAYMENT_SIGNATURE, Matcher::Missing)
        .with_status(402)
        .with_header(headers::AMOUNT, "0.01")
        .with_header(headers::CURRENCY, "USDC")
        .with_header(headers::RECIPIENT, "R1")
        .with_header(headers::REFERENCE, "pay_abc")
        .with_header(headers::EXPIRES, &expires_in(600))
        .create_async()
        .await;
    let paid = server
        .mock("POST", "/generate")
        .match_header(headers::PAYMENT_SIGNATURE, "sig_9")
        .match_body(Matcher::Json(body.clone()))
        .with_status(201)
        .with_body(json!({"id": 1}).to_string())
        .create_async()
        .await;

    let client = test_client(RecordingExecutor::new("sig_9"));
    let response = client
        .post(&format!("{}/generate", server.url()), body)
        .await
        .unwrap();

    paid.assert_async().await;
    assert_eq!(response.status, 201);
    assert_eq!(response.payment_made.unwrap().currency, Currency::Stable);
}

#[tokio::test]
async fn test_expired_challenge_is_never_paid() {
    let mut server = Server::new_async().await;
    let challenge = mock_challenge(&mut server, "0.05", &expires_in(-10), 1).await;
    let paid = mock_paid(&mut server, "sig_123", 0).await;

    let executor = RecordingExecutor::new("sig_123");
    let client = test_client(executor.clone());

    let err = client
        .get(&format!("{}/premium", server.url()))
        .await
        .unwrap_err();

    challenge.assert_async().await;
    paid.assert_async().await;
    assert_eq!(executor.calls(), 0);
    match err {
        X402Error::PaymentExpired { reference, .. } => assert_eq!(reference, "pay_abc"),
        other => panic!("expected PaymentExpired, got {:?}", other),
    }
}

#[tokio::test]
async fn test_challenge_without_expiry_is_never_paid() {
    let mut server = Server::new_async().await;
    let _challenge = server
        .mock("GET", "/premium")
        .with_status(402)
        .with_header(headers::AMOUNT, "0.05")
        .with_header(headers::RECIPIENT, "R1")
        .with_header(headers::REFERENCE, "pay_abc")
        .create_async()
        .await;

    let executor = RecordingExecutor::new("sig_123");
    let client = test_client(executor.clone());

    let err = client
        .get(&format!("{}/premium", server.url()))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "PAYMENT_EXPIRED");
    assert_eq!(executor.calls(), 0);
}

#[tokio::test]
async fn test_amount_over_ceiling_is_never_paid() {
    let mut server = Server::new_async().await;
    let challenge = mock_challenge(&mut server, "0.5", &expires_in(600), 2).await;
    let paid = mock_paid(&mut server, "sig_123", 1).await;

    let executor = RecordingExecutor::new("sig_123");
    let client = test_client(executor.clone());
    let url = format!("{}/premium", server.url());

    let err = client.get(&url).await.unwrap_err();
    match err {
        X402Error::MaxPaymentExceeded { requested, limit } => {
            assert_eq!(requested, Decimal::from_str("0.5").unwrap());
            assert_eq!(limit, Decimal::from_str("0.1").unwrap());
        }
        other => panic!("expected MaxPaymentExceeded, got {:?}", other),
    }
    assert_eq!(executor.calls(), 0);

    // A per-call ceiling overrides the client-wide one.
    let response = client
        .execute(
            &url,
            RequestOptions::get().with_max_payment(Decimal::from_str("1").unwrap()),
        )
        .await
        .unwrap();

    challenge.assert_async().await;
    paid.assert_async().await;
    assert_eq!(executor.calls(), 1);
    assert!(response.payment_made.is_some());
}

#[tokio::test]
async fn test_missing_executor_is_a_configuration_error() {
    let mut server = Server::new_async().await;
    let _challenge = mock_challenge(&mut server, "0.05", &expires_in(600), 1).await;

    let client = X402Client::new(test_config()).unwrap();
    let err = client
        .get(&format!("{}/premium", server.url()))
        .await
        .unwrap_err();

    match err {
        X402Error::Configuration { field, .. } => assert_eq!(field, "executor"),
        other => panic!("expected Configuration, got {:?}", other),
    }
}

#[tokio::test]
async fn test_executor_failure_propagates() {
    let mut server = Server::new_async().await;
    let _challenge = mock_challenge(&mut server, "0.05", &expires_in(600), 1).await;
    let paid = mock_paid(&mut server, "sig_123", 0).await;

    let client = X402Client::new(test_config())
        .unwrap()
        .with_executor(LockedWallet);
    let err = client
        .get(&format!("{}/premium", server.url()))
        .await
        .unwrap_err();

    paid.assert_async().await;
    assert_eq!(err.code(), "EXECUTOR_ERROR");
    assert!(err.to_string().contains("wallet locked"));
}

#[tokio::test]
async fn test_incomplete_challenge_is_invalid() {
    let mut server = Server::new_async().await;
    let _challenge = server
        .mock("GET", "/premium")
        .with_status(402)
        .with_header(headers::AMOUNT, "0.05")
        .with_header(headers::RECIPIENT, "R1")
        .with_header(headers::EXPIRES, &expires_in(600))
        .create_async()
        .await;

    let executor = RecordingExecutor::new("sig_123");
    let client = test_client(executor.clone());
    let err = client
        .get(&format!("{}/premium", server.url()))
        .await
        .unwrap_err();

    assert!(matches!(err, X402Error::InvalidChallenge { .. }));
    assert_eq!(executor.calls(), 0);
}

#[tokio::test]
async fn test_auto_sign_disabled_surfaces_challenge() {
    let mut server = Server::new_async().await;
    let _challenge = mock_challenge(&mut server, "0.05", &expires_in(600), 1).await;

    let executor = RecordingExecutor::new("sig_123");
    let client = test_client(executor.clone());
    let err = client
        .execute(
            &format!("{}/premium", server.url()),
            RequestOptions::get().with_auto_sign(false),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(402));
    assert_eq!(err.code(), "PAYMENT_REQUIRED");
    assert_eq!(executor.calls(), 0);
}

#[tokio::test]
async fn test_second_challenge_is_not_paid_again() {
    let mut server = Server::new_async().await;
    let challenge = mock_challenge(&mut server, "0.05", &expires_in(600), 1).await;
    let rejected = server
        .mock("GET", "/premium")
        .match_header(headers::PAYMENT_SIGNATURE, "sig_bad")
        .with_status(402)
        .with_body(
            json!({"error": "Payment verification failed", "code": "VERIFICATION_FAILED"})
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let executor = RecordingExecutor::new("sig_bad");
    let client = test_client(executor.clone());
    let err = client
        .get(&format!("{}/premium", server.url()))
        .await
        .unwrap_err();

    challenge.assert_async().await;
    rejected.assert_async().await;
    assert_eq!(executor.calls(), 1);
    match err {
        X402Error::Api {
            code,
            status,
            message,
            ..
        } => {
            assert_eq!(code, "VERIFICATION_FAILED");
            assert_eq!(status, Some(402));
            assert_eq!(message, "Payment verification failed");
        }
        other => panic!("expected Api, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rate_limited_paid_retry_is_not_resent() {
    let mut server = Server::new_async().await;
    let challenge = mock_challenge(&mut server, "0.05", &expires_in(600), 1).await;
    let limited = server
        .mock("GET", "/premium")
        .match_header(headers::PAYMENT_SIGNATURE, "sig_123")
        .with_status(429)
        .with_header("retry-after", "0")
        .with_body(json!({"error": "Too many requests"}).to_string())
        .expect(1)
        .create_async()
        .await;

    let executor = RecordingExecutor::new("sig_123");
    let client = test_client(executor.clone());
    let err = client
        .get(&format!("{}/premium", server.url()))
        .await
        .unwrap_err();

    challenge.assert_async().await;
    limited.assert_async().await;
    assert_eq!(executor.calls(), 1);
    assert!(matches!(err, X402Error::RateLimited { .. }));
}

#[tokio::test]
async fn test_dropped_paid_retry_is_not_resent() {
    let (url, connections) = challenge_then_drop_server().await;
    let executor = RecordingExecutor::new("sig_123");
    let client = X402Client::new(test_config().with_retry_attempts(3))
        .unwrap()
        .with_executor(executor.clone());

    let err = client.get(&url).await.unwrap_err();

    assert!(matches!(err, X402Error::Network { .. }));
    assert_eq!(executor.calls(), 1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connections.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_rate_limit_waits_and_retries() {
    let mut server = Server::new_async().await;
    let limited = server
        .mock("GET", "/busy")
        .with_status(429)
        .with_header("retry-after", "1")
        .with_body(json!({"error": "Too many requests", "limit": 10}).to_string())
        .expect(1)
        .create_async()
        .await;
    let ok = server
        .mock("GET", "/busy")
        .with_status(200)
        .with_body(json!({"ok": true}).to_string())
        .expect(1)
        .create_async()
        .await;

    let client = X402Client::new(test_config()).unwrap();
    let started = Instant::now();
    let response = client
        .get(&format!("{}/busy", server.url()))
        .await
        .unwrap();

    limited.assert_async().await;
    ok.assert_async().await;
    assert_eq!(response.status, 200);
    assert!(started.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
async fn test_rate_limit_surfaces_when_attempts_run_out() {
    let mut server = Server::new_async().await;
    let limited = server
        .mock("GET", "/busy")
        .with_status(429)
        .with_header("retry-after", "0")
        .expect(2)
        .create_async()
        .await;

    let client = X402Client::new(test_config().with_retry_attempts(2)).unwrap();
    let err = client
        .get(&format!("{}/busy", server.url()))
        .await
        .unwrap_err();

    limited.assert_async().await;
    assert!(matches!(
        err,
        X402Error::RateLimited {
            retry_after: 0,
            ..
        }
    ));
}

#[tokio::test]
async fn test_business_errors_are_not_retried() {
    let mut server = Server::new_async().await;
    let failing = server
        .mock("GET", "/broken")
        .with_status(500)
        .with_body(json!({"error": "ledger unavailable", "code": "LEDGER_DOWN"}).to_string())
        .expect(1)
        .create_async()
        .await;

    let client = X402Client::new(test_config()).unwrap();
    let err = client
        .get(&format!("{}/broken", server.url()))
        .await
        .unwrap_err();

    failing.assert_async().await;
    assert_eq!(err.code(), "LEDGER_DOWN");
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.to_string(), "ledger unavailable");
}

#[tokio::test]
async fn test_transport_failures_are_retried() {
    let (url, connections) = flaky_server(2).await;
    let client = X402Client::new(test_config().with_retry_attempts(3)).unwrap();

    let response = client.get(&url).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.data, Some(json!({"ok": true})));
    assert_eq!(connections.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_transport_failures_exhaust_attempts() {
    let (url, connections) = flaky_server(2).await;
    let client = X402Client::new(test_config().with_retry_attempts(2)).unwrap();

    let err = client.get(&url).await.unwrap_err();

    assert_eq!(connections.load(Ordering::SeqCst), 2);
    match err {
        X402Error::Network {
            timed_out, source, ..
        } => {
            assert!(!timed_out);
            assert!(source.is_some());
        }
        other => panic!("expected Network, got {:?}", other),
    }
}

#[tokio::test]
async fn test_timeout_is_not_retried() {
    let (url, connections) = silent_server().await;
    let client = X402Client::new(test_config().with_retry_attempts(3)).unwrap();

    let err = client
        .execute(
            &url,
            RequestOptions::get().with_timeout(Duration::from_millis(200)),
        )
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connections.load(Ordering::SeqCst), 1);
}

#[test]
fn test_config_validation() {
    assert!(ClientConfig::new().validate().is_ok());
    assert!(ClientConfig::new()
        .with_base_url("ftp://example.com")
        .validate()
        .is_err());
    assert!(ClientConfig::new().with_retry_attempts(0).validate().is_err());
    assert!(ClientConfig::new()
        .with_max_payment(Decimal::ZERO)
        .validate()
        .is_err());
    assert!(X402Client::new(ClientConfig::new().with_base_url("not a url")).is_err());
}

#[test]
fn test_config_from_lookup() {
    let config = ClientConfig::from_lookup(|key| match key {
        "X402_API_KEY" => Some("key-2".to_string()),
        "X402_BASE_URL" => Some("http://localhost:8080/".to_string()),
        "X402_NETWORK" => Some("devnet".to_string()),
        "X402_MAX_PAYMENT" => Some("0.25".to_string()),
        "X402_RETRY_ATTEMPTS" => Some("5".to_string()),
        _ => None,
    })
    .unwrap();

    assert_eq!(config.api_key.as_deref(), Some("key-2"));
    assert_eq!(config.base_url, "http://localhost:8080");
    assert_eq!(config.network, crate::types::Network::Devnet);
    assert_eq!(
        config.max_payment_per_request,
        Decimal::from_str("0.25").unwrap()
    );
    assert_eq!(config.retry_attempts, 5);
    assert_eq!(config.timeout, Duration::from_secs(30));

    let err = ClientConfig::from_lookup(|key| {
        (key == "X402_RETRY_ATTEMPTS").then(|| "many".to_string())
    })
    .unwrap_err();
    assert_eq!(err.code(), "CONFIG_ERROR");
}
