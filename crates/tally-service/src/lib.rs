//! Tally HTTP API Service.
//!
//! This crate provides the HTTP API for the tally points ledger, including:
//!
//! - Wallet balance and transaction history
//! - Point deposits, deductions, and refunds
//! - Payment intent creation and confirmation
//! - Stripe webhook reconciliation and subscription sync
//!
//! # Identity
//!
//! Authentication happens at the upstream gateway; handlers read the
//! authenticated account id from the `x-user-id` header.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers need async for routing consistency

pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod ledger;
pub mod reconcile;
pub mod routes;
pub mod state;
pub mod stripe;
pub mod subscriptions;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use ledger::Ledger;
pub use routes::create_router;
pub use state::AppState;
pub use stripe::{StripeClient, StripeError};
