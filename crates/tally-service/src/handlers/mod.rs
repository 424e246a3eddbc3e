//! HTTP request handlers.

pub mod health;
pub mod payments;
pub mod wallet;
pub mod webhooks;
