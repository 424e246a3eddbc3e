//! Stripe API integration.
//!
//! Typed client for the subset of the Stripe API the reconciliation flow
//! needs, plus webhook signature verification.

pub mod client;
pub mod types;

pub use client::{StripeClient, StripeError};
pub use types::{
    Customer, PaymentIntent, StripeSubscription, SubscriptionItem, WebhookEvent, WebhookEventData,
};
