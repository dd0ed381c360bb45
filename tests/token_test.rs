//! Token lifecycle and authentication against the mock API

mod common;

use chrono::Utc;
use common::{config, context, start_mock_server};
use jobrelay::client::ApiClient;
use jobrelay::config::{ApiConfig, HttpConfig};
use jobrelay::session::AuthError;
use jobrelay::token::{ExpiryReason, TokenEvent, TokenLifecycle, TokenPolicy};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn lifecycle(url: &str) -> TokenLifecycle {
    let api = ApiConfig {
        base_url: url.to_string(),
        ..Default::default()
    };
    let client = ApiClient::new(&api, &HttpConfig::default()).unwrap();
    TokenLifecycle::new(client, TokenPolicy::default())
}

#[tokio::test]
async fn test_validate_remotely_accepts_valid_token() {
    let mock = start_mock_server().await;
    let tokens = lifecycle(&mock.url);
    tokens.set("token-live");

    assert!(tokens.validate_remotely(Duration::from_secs(2)).await);
    assert_eq!(mock.state.jobs_list_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_validate_remotely_rejects_on_401() {
    let mock = start_mock_server().await;
    mock.state.revoke("token-dead");
    let tokens = lifecycle(&mock.url);
    tokens.set("token-dead");

    assert!(!tokens.validate_remotely(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_validate_remotely_fails_open_on_server_error() {
    let mock = start_mock_server().await;
    mock.state.list_failures.store(1, Ordering::SeqCst);
    let tokens = lifecycle(&mock.url);
    tokens.set("token-live");

    assert!(tokens.validate_remotely(Duration::from_secs(2)).await);
    assert_eq!(mock.state.jobs_list_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_validate_remotely_fails_open_on_network_error() {
    // Grab a free port, then close it so nothing is listening
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let tokens = lifecycle(&format!("http://{addr}"));
    tokens.set("token-anything");

    assert!(tokens.validate_remotely(Duration::from_millis(500)).await);
}

#[tokio::test]
async fn test_validate_remotely_without_token() {
    let mock = start_mock_server().await;
    let tokens = lifecycle(&mock.url);

    assert!(!tokens.validate_remotely(Duration::from_secs(2)).await);
    assert_eq!(mock.state.total_requests(), 0);
}

#[tokio::test]
async fn test_local_expiry_skips_remote_check() {
    let mock = start_mock_server().await;
    let tokens = lifecycle(&mock.url);
    let mut expiry = tokens.subscribe();

    tokens.set_issued_at("token-old", Utc::now() - chrono::Duration::minutes(5996));

    assert!(!tokens.check_and_handle_expiration().await);
    assert_eq!(expiry.try_recv().unwrap(), TokenEvent::Expired(ExpiryReason::Local));
    assert_eq!(mock.state.total_requests(), 0);
}

#[tokio::test]
async fn test_remote_revocation_is_reported() {
    let mock = start_mock_server().await;
    mock.state.revoke("token-revoked");
    let tokens = lifecycle(&mock.url);
    let mut expiry = tokens.subscribe();
    tokens.set("token-revoked");

    assert!(!tokens.check_and_handle_expiration().await);
    assert_eq!(expiry.try_recv().unwrap(), TokenEvent::Expired(ExpiryReason::Remote));
}

#[tokio::test]
async fn test_concurrent_callers_share_one_login() {
    let mock = start_mock_server().await;
    let temp = TempDir::new().unwrap();
    let ctx = context(config(&mock.url, temp.path()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let auth = Arc::clone(&ctx.auth);
        handles.push(tokio::spawn(async move { auth.bearer().await }));
    }

    let tokens: Vec<String> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert_eq!(mock.state.logins.load(Ordering::SeqCst), 1);
    assert!(tokens.iter().all(|t| t == "token-1"));
    assert_eq!(ctx.metrics.snapshot().logins, 1);
}

#[tokio::test]
async fn test_rejected_login() {
    let mock = start_mock_server().await;
    mock.state.reject_login.store(true, Ordering::SeqCst);
    let temp = TempDir::new().unwrap();
    let ctx = context(config(&mock.url, temp.path()));

    let err = ctx.auth.authenticate().await.unwrap_err();
    assert!(matches!(err, AuthError::LoginRejected(_)));
    assert!(ctx.tokens.token().is_none());
}

#[tokio::test]
async fn test_revoked_token_triggers_relogin() {
    let mock = start_mock_server().await;
    mock.state.revoke("token-stale");
    let temp = TempDir::new().unwrap();
    let ctx = context(config(&mock.url, temp.path()));
    ctx.tokens.set("token-stale");

    let token = ctx.auth.bearer().await.unwrap();

    assert_eq!(token, "token-1");
    assert_eq!(mock.state.logins.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.tokens.token().as_deref(), Some("token-1"));
}

#[tokio::test]
async fn test_remote_check_is_throttled() {
    let mock = start_mock_server().await;
    let temp = TempDir::new().unwrap();
    let mut cfg = config(&mock.url, temp.path());
    cfg.credentials.token = Some("token-given".into());
    let ctx = context(cfg);

    for _ in 0..5 {
        assert_eq!(ctx.auth.bearer().await.unwrap(), "token-given");
    }

    // One probe for the first call, none until the interval elapses
    assert_eq!(mock.state.jobs_list_requests.load(Ordering::SeqCst), 1);
    assert_eq!(mock.state.logins.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_pre_issued_token_expiry_without_credentials() {
    let mock = start_mock_server().await;
    let temp = TempDir::new().unwrap();
    let mut cfg = config(&mock.url, temp.path());
    cfg.credentials.username = None;
    cfg.credentials.password = None;
    let ctx = context(cfg);
    ctx.tokens
        .set_issued_at("token-given", Utc::now() - chrono::Duration::days(30));

    let err = ctx.auth.bearer().await.unwrap_err();
    assert!(matches!(err, AuthError::TokenExpired));
    assert_eq!(
        err.to_string(),
        "Authentication token has expired. Please login again."
    );
    assert_eq!(mock.state.total_requests(), 0);
}
