//! Payment reconciliation tests against a mock Stripe API.
//!
//! The Stripe API is stood in by `wiremock`; webhook deliveries are signed
//! with the real signature scheme so the verification path is exercised
//! end to end.

use std::sync::Arc;

use axum_test::TestServer;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tally_core::{PaymentStatus, SubscriptionStatus, UserId};
use tally_service::crypto::hmac_sha256_hex;
use tally_service::subscriptions::AccountDirectory;
use tally_service::{create_router, AppState, ServiceConfig, StripeClient};
use tally_store::{RocksStore, Store};

const WEBHOOK_SECRET: &str = "whsec_test";

struct Harness {
    server: TestServer,
    store: Arc<RocksStore>,
    stripe: MockServer,
    _dir: TempDir,
}

/// Directory knowing exactly one account, for email resolution tests.
struct SingleUserDirectory {
    email: String,
    user: UserId,
}

impl AccountDirectory for SingleUserDirectory {
    fn lookup_by_email(&self, email: &str) -> Option<UserId> {
        (email == self.email).then_some(self.user)
    }
}

/// Create a test server wired to a mock Stripe API.
async fn create_harness() -> Harness {
    build_harness(None).await
}

/// Create a test server with an account directory attached.
async fn create_harness_with_directory(directory: Arc<dyn AccountDirectory>) -> Harness {
    build_harness(Some(directory)).await
}

async fn build_harness(directory: Option<Arc<dyn AccountDirectory>>) -> Harness {
    let stripe_mock = MockServer::start().await;

    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let store = Arc::new(RocksStore::open(temp_dir.path()).expect("Failed to open store"));

    let config = ServiceConfig {
        data_dir: temp_dir.path().to_string_lossy().to_string(),
        stripe_api_key: Some("sk_test_xxx".into()),
        stripe_webhook_secret: Some(WEBHOOK_SECRET.into()),
        ..ServiceConfig::default()
    };

    let client = StripeClient::new("sk_test_xxx", Some(WEBHOOK_SECRET.into()))
        .expect("Failed to create Stripe client")
        .with_base_url(stripe_mock.uri());

    let mut state = AppState::new(store.clone(), config).with_stripe(client);
    if let Some(directory) = directory {
        state = state.with_directory(directory);
    }
    let server = TestServer::new(create_router(state)).expect("Failed to create test server");

    Harness {
        server,
        store,
        stripe: stripe_mock,
        _dir: temp_dir,
    }
}

/// Sign a webhook body the way Stripe does.
fn stripe_signature(body: &str) -> String {
    let timestamp = "1700000000";
    let sig = hmac_sha256_hex(WEBHOOK_SECRET, &format!("{timestamp}.{body}"));
    format!("t={timestamp},v1={sig}")
}

/// Mock the customer + intent creation endpoints.
async fn mock_intent_creation(stripe: &MockServer, intent_id: &str, amount: i64) {
    Mock::given(method("POST"))
        .and(path("/customers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cus_test",
            "email": null,
            "metadata": {},
            "created": 1_700_000_000
        })))
        .mount(stripe)
        .await;

    Mock::given(method("POST"))
        .and(path("/payment_intents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": intent_id,
            "amount": amount,
            "currency": "usd",
            "status": "requires_confirmation",
            "customer": "cus_test",
            "client_secret": format!("{intent_id}_secret"),
            "created": 1_700_000_000
        })))
        .mount(stripe)
        .await;
}

/// Mock the server-side confirm endpoint for one intent.
async fn mock_confirm(stripe: &MockServer, intent_id: &str, amount: i64, status: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/payment_intents/{intent_id}/confirm")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": intent_id,
            "amount": amount,
            "currency": "usd",
            "status": status,
            "customer": "cus_test",
            "created": 1_700_000_000
        })))
        .mount(stripe)
        .await;
}

async fn create_intent(harness: &Harness, user: &UserId, amount: i64) -> serde_json::Value {
    let response = harness
        .server
        .post("/v1/payments/intent")
        .add_header("x-user-id", user.to_string())
        .json(&json!({"amount": amount}))
        .await;
    response.assert_status_ok();
    response.json()
}

async fn get_balance(harness: &Harness, user: &UserId) -> i64 {
    let response = harness
        .server
        .get("/v1/wallet/balance")
        .add_header("x-user-id", user.to_string())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    body["balance"].as_i64().unwrap()
}

// ============================================================================
// Payment intent creation & confirmation
// ============================================================================

#[tokio::test]
async fn create_intent_returns_client_secret_and_pending_record() {
    let harness = create_harness().await;
    let user = UserId::generate();
    mock_intent_creation(&harness.stripe, "pi_1", 1000).await;

    let body = create_intent(&harness, &user, 1000).await;
    assert_eq!(body["intent_id"], "pi_1");
    assert_eq!(body["client_secret"], "pi_1_secret");
    assert_eq!(body["points_amount"], 1000); // default 1 point per cent

    let payment = harness.store.get_payment_by_intent("pi_1").unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.owner, user);
    assert_eq!(payment.customer_id.as_deref(), Some("cus_test"));

    // No credit before settlement.
    assert_eq!(get_balance(&harness, &user).await, 0);
}

#[tokio::test]
async fn confirm_settles_and_credits_wallet() {
    let harness = create_harness().await;
    let user = UserId::generate();
    mock_intent_creation(&harness.stripe, "pi_2", 1500).await;
    mock_confirm(&harness.stripe, "pi_2", 1500, "succeeded").await;

    create_intent(&harness, &user, 1500).await;

    let response = harness
        .server
        .post("/v1/payments/confirm")
        .add_header("x-user-id", user.to_string())
        .json(&json!({"intent_id": "pi_2"}))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "succeeded");
    assert!(body["completed_at"].is_string());

    assert_eq!(get_balance(&harness, &user).await, 1500);
}

#[tokio::test]
async fn double_confirm_credits_once() {
    let harness = create_harness().await;
    let user = UserId::generate();
    mock_intent_creation(&harness.stripe, "pi_3", 1000).await;
    mock_confirm(&harness.stripe, "pi_3", 1000, "succeeded").await;

    create_intent(&harness, &user, 1000).await;

    for _ in 0..2 {
        harness
            .server
            .post("/v1/payments/confirm")
            .add_header("x-user-id", user.to_string())
            .json(&json!({"intent_id": "pi_3"}))
            .await
            .assert_status_ok();
    }

    assert_eq!(get_balance(&harness, &user).await, 1000);
}

#[tokio::test]
async fn confirm_requires_matching_owner() {
    let harness = create_harness().await;
    let user = UserId::generate();
    let stranger = UserId::generate();
    mock_intent_creation(&harness.stripe, "pi_4", 1000).await;

    create_intent(&harness, &user, 1000).await;

    let response = harness
        .server
        .post("/v1/payments/confirm")
        .add_header("x-user-id", stranger.to_string())
        .json(&json!({"intent_id": "pi_4"}))
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn confirm_unknown_intent_is_not_found() {
    let harness = create_harness().await;
    let user = UserId::generate();

    let response = harness
        .server
        .post("/v1/payments/confirm")
        .add_header("x-user-id", user.to_string())
        .json(&json!({"intent_id": "pi_never_created"}))
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn failed_confirmation_marks_payment_failed() {
    let harness = create_harness().await;
    let user = UserId::generate();
    mock_intent_creation(&harness.stripe, "pi_5", 1000).await;
    mock_confirm(&harness.stripe, "pi_5", 1000, "requires_payment_method").await;

    create_intent(&harness, &user, 1000).await;

    let response = harness
        .server
        .post("/v1/payments/confirm")
        .add_header("x-user-id", user.to_string())
        .json(&json!({"intent_id": "pi_5"}))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "failed");

    assert_eq!(get_balance(&harness, &user).await, 0);
}

#[tokio::test]
async fn payment_history_lists_newest_first() {
    let harness = create_harness().await;
    let user = UserId::generate();
    mock_intent_creation(&harness.stripe, "pi_6", 1000).await;

    create_intent(&harness, &user, 1000).await;

    let response = harness
        .server
        .get("/v1/payments")
        .add_header("x-user-id", user.to_string())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["payments"].as_array().unwrap().len(), 1);
    assert_eq!(body["payments"][0]["intent_id"], "pi_6");
}

// ============================================================================
// Webhooks
// ============================================================================

fn intent_webhook_body(event_id: &str, event_type: &str, intent_id: &str, status: &str) -> String {
    json!({
        "id": event_id,
        "type": event_type,
        "created": 1_700_000_000,
        "data": {"object": {
            "id": intent_id,
            "amount": 1000,
            "currency": "usd",
            "status": status
        }}
    })
    .to_string()
}

#[tokio::test]
async fn webhook_rejects_bad_signature_before_storage() {
    let harness = create_harness().await;
    let body = intent_webhook_body("evt_bad", "payment_intent.succeeded", "pi_x", "succeeded");

    let response = harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", "t=1700000000,v1=deadbeef")
        .text(body)
        .await;
    response.assert_status_bad_request();

    // Nothing was recorded.
    assert!(harness.store.get_event("evt_bad").unwrap().is_none());
}

#[tokio::test]
async fn webhook_rejects_missing_signature() {
    let harness = create_harness().await;
    let body = intent_webhook_body("evt_nosig", "payment_intent.succeeded", "pi_x", "succeeded");

    let response = harness.server.post("/webhooks/stripe").text(body).await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn webhook_settles_payment_and_dedupes() {
    let harness = create_harness().await;
    let user = UserId::generate();
    mock_intent_creation(&harness.stripe, "pi_7", 1000).await;
    create_intent(&harness, &user, 1000).await;

    let body = intent_webhook_body("evt_1", "payment_intent.succeeded", "pi_7", "succeeded");
    let signature = stripe_signature(&body);

    for _ in 0..2 {
        let response = harness
            .server
            .post("/webhooks/stripe")
            .add_header("stripe-signature", signature.clone())
            .text(body.clone())
            .await;
        response.assert_status_ok();
    }

    // Delivered twice, credited once.
    assert_eq!(get_balance(&harness, &user).await, 1000);
    assert!(harness.store.get_event("evt_1").unwrap().unwrap().processed);
}

#[tokio::test]
async fn webhook_then_confirm_credits_once() {
    let harness = create_harness().await;
    let user = UserId::generate();
    mock_intent_creation(&harness.stripe, "pi_8", 1000).await;
    mock_confirm(&harness.stripe, "pi_8", 1000, "succeeded").await;
    create_intent(&harness, &user, 1000).await;

    let body = intent_webhook_body("evt_2", "payment_intent.succeeded", "pi_8", "succeeded");
    harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", stripe_signature(&body))
        .text(body)
        .await
        .assert_status_ok();

    harness
        .server
        .post("/v1/payments/confirm")
        .add_header("x-user-id", user.to_string())
        .json(&json!({"intent_id": "pi_8"}))
        .await
        .assert_status_ok();

    assert_eq!(get_balance(&harness, &user).await, 1000);
}

#[tokio::test]
async fn webhook_unknown_intent_is_acknowledged() {
    let harness = create_harness().await;

    let body = intent_webhook_body(
        "evt_3",
        "payment_intent.succeeded",
        "pi_created_elsewhere",
        "succeeded",
    );
    let response = harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", stripe_signature(&body))
        .text(body)
        .await;
    response.assert_status_ok();

    assert!(harness.store.get_event("evt_3").unwrap().unwrap().processed);
}

#[tokio::test]
async fn webhook_payment_failed_updates_record() {
    let harness = create_harness().await;
    let user = UserId::generate();
    mock_intent_creation(&harness.stripe, "pi_9", 1000).await;
    create_intent(&harness, &user, 1000).await;

    let body = intent_webhook_body(
        "evt_4",
        "payment_intent.payment_failed",
        "pi_9",
        "requires_payment_method",
    );
    harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", stripe_signature(&body))
        .text(body)
        .await
        .assert_status_ok();

    let payment = harness.store.get_payment_by_intent("pi_9").unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(get_balance(&harness, &user).await, 0);
}

// ============================================================================
// Subscription sync
// ============================================================================

fn subscription_webhook_body(
    event_id: &str,
    event_type: &str,
    subscription_id: &str,
    customer: &str,
    status: &str,
    canceled_at: Option<i64>,
) -> String {
    json!({
        "id": event_id,
        "type": event_type,
        "created": 1_700_000_000,
        "data": {"object": {
            "id": subscription_id,
            "customer": customer,
            "status": status,
            "current_period_start": 1_700_000_000,
            "current_period_end": 1_702_592_000,
            "cancel_at_period_end": canceled_at.is_some(),
            "canceled_at": canceled_at,
            "items": {"data": [{"price": {"id": "price_basic"}, "quantity": 1}]},
            "metadata": {}
        }}
    })
    .to_string()
}

#[tokio::test]
async fn subscription_lifecycle_active_to_canceled() {
    let harness = create_harness().await;
    let user = UserId::generate();

    // Intent creation links cus_test to the user, so subscription events
    // for that customer resolve without metadata.
    mock_intent_creation(&harness.stripe, "pi_10", 1000).await;
    create_intent(&harness, &user, 1000).await;

    let created = subscription_webhook_body(
        "evt_5",
        "customer.subscription.created",
        "sub_1",
        "cus_test",
        "active",
        None,
    );
    harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", stripe_signature(&created))
        .text(created)
        .await
        .assert_status_ok();

    let record = harness.store.get_subscription("sub_1").unwrap().unwrap();
    assert_eq!(record.owner, user);
    assert_eq!(record.status, SubscriptionStatus::Active);
    assert_eq!(record.price_id, "price_basic");
    let created_at = record.created_at;

    let deleted = subscription_webhook_body(
        "evt_6",
        "customer.subscription.deleted",
        "sub_1",
        "cus_test",
        "canceled",
        Some(1_701_000_000),
    );
    harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", stripe_signature(&deleted))
        .text(deleted)
        .await
        .assert_status_ok();

    let record = harness.store.get_subscription("sub_1").unwrap().unwrap();
    assert_eq!(record.status, SubscriptionStatus::Canceled);
    assert!(record.canceled_at.is_some());
    assert_eq!(record.created_at, created_at);
}

#[tokio::test]
async fn subscription_owner_resolved_via_customer_email() {
    let user = UserId::generate();
    let directory = Arc::new(SingleUserDirectory {
        email: "ada@example.com".into(),
        user,
    });
    let harness = create_harness_with_directory(directory).await;

    // The customer is unknown locally; the sync falls back to asking the
    // processor for the customer's email.
    Mock::given(method("GET"))
        .and(path("/customers/cus_mail"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cus_mail",
            "email": "ada@example.com",
            "metadata": {},
            "created": 1_700_000_000
        })))
        .mount(&harness.stripe)
        .await;

    let body = subscription_webhook_body(
        "evt_8",
        "customer.subscription.created",
        "sub_mail",
        "cus_mail",
        "active",
        None,
    );
    harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", stripe_signature(&body))
        .text(body)
        .await
        .assert_status_ok();

    let record = harness.store.get_subscription("sub_mail").unwrap().unwrap();
    assert_eq!(record.owner, user);
    assert_eq!(record.status, SubscriptionStatus::Active);
    // The resolution also established the customer link for later events.
    assert_eq!(
        harness.store.owner_for_customer("cus_mail").unwrap(),
        Some(user)
    );
}

#[tokio::test]
async fn subscription_event_for_unknown_customer_is_skipped() {
    let harness = create_harness().await;

    let body = subscription_webhook_body(
        "evt_7",
        "customer.subscription.created",
        "sub_orphan",
        "cus_unknown",
        "active",
        None,
    );
    harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", stripe_signature(&body))
        .text(body)
        .await
        .assert_status_ok();

    assert!(harness.store.get_subscription("sub_orphan").unwrap().is_none());
    // Skipped but acknowledged: the event is processed.
    assert!(harness.store.get_event("evt_7").unwrap().unwrap().processed);
}
