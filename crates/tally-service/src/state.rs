//! Application state.

use std::sync::Arc;

use tally_store::RocksStore;

use crate::config::ServiceConfig;
use crate::ledger::Ledger;
use crate::stripe::StripeClient;
use crate::subscriptions::AccountDirectory;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<RocksStore>,

    /// The balance ledger service.
    pub ledger: Ledger,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Stripe client for payments (optional).
    pub stripe: Option<Arc<StripeClient>>,

    /// Account lookup by email, supplied by the embedding platform
    /// (optional). Last-resort owner resolution for subscription sync.
    pub directory: Option<Arc<dyn AccountDirectory>>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<RocksStore>, config: ServiceConfig) -> Self {
        let stripe = config.stripe_api_key.as_ref().and_then(|key| {
            match StripeClient::new(key, config.stripe_webhook_secret.clone()) {
                Ok(client) => {
                    tracing::info!("Stripe integration enabled");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create Stripe client");
                    None
                }
            }
        });

        if stripe.is_none() {
            tracing::warn!("Stripe not configured - payments will not be available");
        }

        Self {
            ledger: Ledger::new(store.clone()),
            store,
            config,
            stripe,
            directory: None,
        }
    }

    /// Replace the Stripe client. Used by tests to point at a mock server.
    #[must_use]
    pub fn with_stripe(mut self, stripe: StripeClient) -> Self {
        self.stripe = Some(Arc::new(stripe));
        self
    }

    /// Attach an account directory for email-based subscription owner
    /// resolution.
    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn AccountDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Check if Stripe is configured.
    #[must_use]
    pub fn has_stripe(&self) -> bool {
        self.stripe.is_some()
    }
}
