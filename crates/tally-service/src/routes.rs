//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, payments, wallet, webhooks};
use crate::state::AppState;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Wallet (`x-user-id` set by the gateway)
/// - `GET /v1/wallet` - Get or create the caller's wallet
/// - `GET /v1/wallet/balance` - Get current balance
/// - `GET /v1/wallet/transactions` - List transaction history
/// - `POST /v1/wallet/deposit` - Credit points
/// - `POST /v1/wallet/deduct` - Debit points
/// - `POST /v1/wallet/refund` - Credit points back after a reversal
///
/// ## Payments
/// - `POST /v1/payments/intent` - Create a payment intent
/// - `POST /v1/payments/confirm` - Confirm a payment by intent id
/// - `GET /v1/payments` - List payment history
/// - `GET /v1/payments/:id` - Get one payment record
///
/// ## Webhooks (signature verification)
/// - `POST /webhooks/stripe` - Stripe webhooks
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let api_routes = Router::new()
        // Wallet
        .route("/wallet", get(wallet::get_or_create_wallet))
        .route("/wallet/balance", get(wallet::get_balance))
        .route("/wallet/transactions", get(wallet::list_transactions))
        .route("/wallet/deposit", post(wallet::deposit))
        .route("/wallet/deduct", post(wallet::deduct))
        .route("/wallet/refund", post(wallet::refund))
        // Payments
        .route("/payments", get(payments::list_payments))
        .route("/payments/intent", post(payments::create_intent))
        .route("/payments/confirm", post(payments::confirm_payment))
        .route("/payments/:id", get(payments::get_payment))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Webhooks (no rate limit - controlled by the processor)
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
