//! End-to-end ledger tests over the HTTP API.

use std::sync::Arc;

use axum_test::TestServer;
use serde_json::json;
use tempfile::TempDir;

use tally_core::UserId;
use tally_service::{create_router, AppState, ServiceConfig};
use tally_store::RocksStore;

/// Create a test server without a payment processor.
fn create_test_server() -> (TestServer, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let store = RocksStore::open(temp_dir.path()).expect("Failed to open store");

    let config = ServiceConfig {
        data_dir: temp_dir.path().to_string_lossy().to_string(),
        ..ServiceConfig::default()
    };

    let state = AppState::new(Arc::new(store), config);
    let server = TestServer::new(create_router(state)).expect("Failed to create test server");

    (server, temp_dir)
}

fn user_header(user_id: &UserId) -> String {
    user_id.to_string()
}

#[tokio::test]
async fn health_endpoint() {
    let (server, _dir) = create_test_server();

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["stripe_configured"], false);
}

#[tokio::test]
async fn missing_user_header_is_rejected() {
    let (server, _dir) = create_test_server();

    let response = server.get("/v1/wallet/balance").await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn invalid_user_header_is_rejected() {
    let (server, _dir) = create_test_server();

    let response = server
        .get("/v1/wallet/balance")
        .add_header("x-user-id", "not-a-uuid")
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn balance_is_zero_without_wallet() {
    let (server, _dir) = create_test_server();
    let user = UserId::generate();

    let response = server
        .get("/v1/wallet/balance")
        .add_header("x-user-id", user_header(&user))
        .await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["balance"], 0);
}

#[tokio::test]
async fn wallet_endpoint_creates_wallet_once() {
    let (server, _dir) = create_test_server();
    let user = UserId::generate();

    let first = server
        .get("/v1/wallet")
        .add_header("x-user-id", user_header(&user))
        .await;
    first.assert_status_ok();
    let first_body: serde_json::Value = first.json();
    assert_eq!(first_body["balance"], 0);
    assert_eq!(first_body["owner"], user.to_string());

    let second = server
        .get("/v1/wallet")
        .add_header("x-user-id", user_header(&user))
        .await;
    let second_body: serde_json::Value = second.json();
    assert_eq!(second_body["created_at"], first_body["created_at"]);
}

#[tokio::test]
async fn deposit_deduct_and_history() {
    let (server, _dir) = create_test_server();
    let user = UserId::generate();

    let deposit = server
        .post("/v1/wallet/deposit")
        .add_header("x-user-id", user_header(&user))
        .json(&json!({"amount": 1000, "reference": "grant"}))
        .await;
    deposit.assert_status_ok();
    let body: serde_json::Value = deposit.json();
    assert_eq!(body["balance"], 1000);

    let deduct = server
        .post("/v1/wallet/deduct")
        .add_header("x-user-id", user_header(&user))
        .json(&json!({"amount": 300, "reference": "tool-run-1"}))
        .await;
    deduct.assert_status_ok();
    let body: serde_json::Value = deduct.json();
    assert_eq!(body["balance"], 700);

    let history = server
        .get("/v1/wallet/transactions")
        .add_header("x-user-id", user_header(&user))
        .await;
    history.assert_status_ok();
    let body: serde_json::Value = history.json();

    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 2);
    // Newest first
    assert_eq!(transactions[0]["kind"], "deduct");
    assert_eq!(transactions[0]["amount"], -300);
    assert_eq!(transactions[0]["reference"], "tool-run-1");
    assert_eq!(transactions[1]["kind"], "deposit");
    assert_eq!(transactions[1]["amount"], 1000);
    assert_eq!(body["has_more"], false);
}

#[tokio::test]
async fn overdraw_returns_payment_required() {
    let (server, _dir) = create_test_server();
    let user = UserId::generate();

    server
        .post("/v1/wallet/deposit")
        .add_header("x-user-id", user_header(&user))
        .json(&json!({"amount": 100, "reference": "grant"}))
        .await
        .assert_status_ok();

    let response = server
        .post("/v1/wallet/deduct")
        .add_header("x-user-id", user_header(&user))
        .json(&json!({"amount": 250, "reference": "tool-run"}))
        .await;
    response.assert_status(axum::http::StatusCode::PAYMENT_REQUIRED);

    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_balance");
    assert_eq!(body["error"]["details"]["balance"], 100);
    assert_eq!(body["error"]["details"]["required"], 250);

    // Balance unchanged after the refused deduct.
    let balance = server
        .get("/v1/wallet/balance")
        .add_header("x-user-id", user_header(&user))
        .await;
    let body: serde_json::Value = balance.json();
    assert_eq!(body["balance"], 100);
}

#[tokio::test]
async fn non_positive_amounts_are_bad_requests() {
    let (server, _dir) = create_test_server();
    let user = UserId::generate();

    for amount in [0, -5] {
        let response = server
            .post("/v1/wallet/deposit")
            .add_header("x-user-id", user_header(&user))
            .json(&json!({"amount": amount, "reference": "x"}))
            .await;
        response.assert_status_bad_request();
    }
}

#[tokio::test]
async fn refund_after_deduct() {
    let (server, _dir) = create_test_server();
    let user = UserId::generate();

    server
        .post("/v1/wallet/deposit")
        .add_header("x-user-id", user_header(&user))
        .json(&json!({"amount": 500, "reference": "grant"}))
        .await
        .assert_status_ok();

    server
        .post("/v1/wallet/deduct")
        .add_header("x-user-id", user_header(&user))
        .json(&json!({"amount": 200, "reference": "tool-run-7"}))
        .await
        .assert_status_ok();

    let refund = server
        .post("/v1/wallet/refund")
        .add_header("x-user-id", user_header(&user))
        .json(&json!({"amount": 200, "reference": "tool-run-7"}))
        .await;
    refund.assert_status_ok();
    let body: serde_json::Value = refund.json();
    assert_eq!(body["balance"], 500);

    let history = server
        .get("/v1/wallet/transactions")
        .add_header("x-user-id", user_header(&user))
        .await;
    let body: serde_json::Value = history.json();
    assert_eq!(body["transactions"][0]["kind"], "refund");
    assert_eq!(body["transactions"][0]["amount"], 200);
}

#[tokio::test]
async fn wallets_are_isolated_per_user() {
    let (server, _dir) = create_test_server();
    let alice = UserId::generate();
    let bob = UserId::generate();

    server
        .post("/v1/wallet/deposit")
        .add_header("x-user-id", user_header(&alice))
        .json(&json!({"amount": 1000, "reference": "grant"}))
        .await
        .assert_status_ok();

    let response = server
        .get("/v1/wallet/balance")
        .add_header("x-user-id", user_header(&bob))
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["balance"], 0);
}

#[tokio::test]
async fn payment_endpoints_require_stripe() {
    let (server, _dir) = create_test_server();
    let user = UserId::generate();

    let response = server
        .post("/v1/payments/intent")
        .add_header("x-user-id", user_header(&user))
        .json(&json!({"amount": 1000}))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_GATEWAY);
}
