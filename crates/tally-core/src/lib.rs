//! Core types and utilities for tally.
//!
//! This crate provides the foundational types used throughout the tally
//! ledger:
//!
//! - **Identifiers**: `UserId`, `PaymentId`, `TransactionId`
//! - **Wallets**: `Wallet`
//! - **Transactions**: `Transaction`, `TransactionKind`
//! - **Payments**: `PaymentRecord`, `PaymentStatus`, `PaymentKind`
//! - **Events**: `ProcessorEvent`
//! - **Subscriptions**: `SubscriptionRecord`, `SubscriptionStatus`
//!
//! # Amount representation
//!
//! All monetary and point amounts are `i64` minor units (cents / points),
//! stored as integers to avoid floating-point precision issues. Conversion
//! to display decimals happens only at the API boundary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod event;
pub mod ids;
pub mod payment;
pub mod subscription;
pub mod transaction;
pub mod wallet;

pub use event::ProcessorEvent;
pub use ids::{IdError, PaymentId, TransactionId, UserId};
pub use payment::{PaymentKind, PaymentRecord, PaymentStatus};
pub use subscription::{SubscriptionRecord, SubscriptionStatus};
pub use transaction::{Transaction, TransactionKind};
pub use wallet::Wallet;
