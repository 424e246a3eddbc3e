//! Stripe API client implementation.

use reqwest::Client;
use std::time::Duration;

use crate::crypto::{constant_time_eq, hmac_sha256_hex};

use super::types::{Customer, PaymentIntent, StripeErrorResponse, StripeSubscription};

/// Error type for Stripe operations.
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe API returned an error.
    #[error("Stripe API error: {error_type} - {message}")]
    Api {
        /// Error type.
        error_type: String,
        /// Error message.
        message: String,
        /// Error code.
        code: Option<String>,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid webhook signature.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Stripe API client.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    api_key: String,
    webhook_secret: Option<String>,
    base_url: String,
}

impl StripeClient {
    /// Stripe API base URL.
    const BASE_URL: &'static str = "https://api.stripe.com/v1";

    /// Create a new Stripe client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Stripe secret API key (`sk_test_...` or `sk_live_...`)
    /// * `webhook_secret` - Optional webhook signing secret (whsec_...)
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        api_key: impl Into<String>,
        webhook_secret: Option<String>,
    ) -> Result<Self, StripeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(StripeError::Http)?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            webhook_secret,
            base_url: Self::BASE_URL.to_string(),
        })
    }

    /// Override the API base URL. Used by tests to point at a mock server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Create a new Stripe customer.
    ///
    /// Our internal account id is stored in customer metadata so events can
    /// be attributed even when local links are missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Stripe rejects it.
    pub async fn create_customer(
        &self,
        user_id: &str,
        email: Option<&str>,
        name: Option<&str>,
    ) -> Result<Customer, StripeError> {
        let mut params = vec![("metadata[user_id]", user_id.to_string())];

        if let Some(email) = email {
            params.push(("email", email.to_string()));
        }
        if let Some(name) = name {
            params.push(("name", name.to_string()));
        }

        let response = self
            .client
            .post(format!("{}/customers", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Get a customer by ID. Returns `None` on 404.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Stripe rejects it.
    pub async fn get_customer(&self, customer_id: &str) -> Result<Option<Customer>, StripeError> {
        let response = self
            .client
            .get(format!("{}/customers/{}", self.base_url, customer_id))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Self::handle_response(response).await.map(Some)
    }

    /// Create a payment intent.
    ///
    /// # Arguments
    ///
    /// * `customer_id` - Stripe customer ID
    /// * `amount` - Amount to charge in minor units
    /// * `currency` - ISO currency code
    /// * `description` - Human-readable description
    /// * `user_id` - Our internal account id (stored as metadata)
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Stripe rejects it.
    pub async fn create_payment_intent(
        &self,
        customer_id: &str,
        amount: i64,
        currency: &str,
        description: &str,
        user_id: &str,
    ) -> Result<PaymentIntent, StripeError> {
        let params = vec![
            ("amount", amount.to_string()),
            ("currency", currency.to_string()),
            ("customer", customer_id.to_string()),
            ("description", description.to_string()),
            ("metadata[user_id]", user_id.to_string()),
        ];

        tracing::debug!(
            user_id = %user_id,
            amount = %amount,
            currency = %currency,
            "Creating Stripe payment intent"
        );

        let response = self
            .client
            .post(format!("{}/payment_intents", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Confirm a payment intent server-side.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Stripe rejects it.
    pub async fn confirm_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, StripeError> {
        let response = self
            .client
            .post(format!(
                "{}/payment_intents/{}/confirm",
                self.base_url, payment_intent_id
            ))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Get a single payment intent by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Stripe rejects it.
    pub async fn get_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, StripeError> {
        let response = self
            .client
            .get(format!(
                "{}/payment_intents/{}",
                self.base_url, payment_intent_id
            ))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Retrieve a subscription by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Stripe rejects it.
    pub async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<StripeSubscription, StripeError> {
        let response = self
            .client
            .get(format!(
                "{}/subscriptions/{}",
                self.base_url, subscription_id
            ))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Verify a webhook signature.
    ///
    /// The `Stripe-Signature` header has the form
    /// `t=timestamp,v1=signature[,v1=signature2,...]`; the signed payload is
    /// `"{timestamp}.{body}"`. Comparison is constant-time.
    ///
    /// # Errors
    ///
    /// - `StripeError::Configuration` if no webhook secret is configured or
    ///   the header carries no timestamp.
    /// - `StripeError::InvalidSignature` if no candidate signature matches.
    pub fn verify_webhook_signature(
        &self,
        payload: &str,
        signature: &str,
    ) -> Result<(), StripeError> {
        let secret = self
            .webhook_secret
            .as_ref()
            .ok_or_else(|| StripeError::Configuration("Webhook secret not configured".into()))?;

        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature.split(',') {
            let mut kv = part.splitn(2, '=');
            match (kv.next(), kv.next()) {
                (Some("t"), Some(ts)) => timestamp = Some(ts),
                (Some("v1"), Some(sig)) => signatures.push(sig),
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| StripeError::Configuration("Missing timestamp".into()))?;

        if signatures.is_empty() {
            return Err(StripeError::InvalidSignature);
        }

        let signed_payload = format!("{timestamp}.{payload}");
        let expected = hmac_sha256_hex(secret, &signed_payload);

        let valid = signatures.iter().any(|sig| constant_time_eq(&expected, sig));

        if valid {
            Ok(())
        } else {
            Err(StripeError::InvalidSignature)
        }
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<StripeErrorResponse, _> = response.json().await;

        match error_body {
            Ok(stripe_error) => Err(StripeError::Api {
                error_type: stripe_error.error.error_type,
                message: stripe_error.error.message,
                code: stripe_error.error.code,
            }),
            Err(_) => Err(StripeError::Api {
                error_type: "unknown".to_string(),
                message: format!("HTTP {status}"),
                code: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_secret(secret: &str) -> StripeClient {
        StripeClient::new("sk_test_xxx", Some(secret.to_string())).unwrap()
    }

    fn sign(secret: &str, timestamp: &str, payload: &str) -> String {
        let sig = hmac_sha256_hex(secret, &format!("{timestamp}.{payload}"));
        format!("t={timestamp},v1={sig}")
    }

    #[test]
    fn valid_signature_accepted() {
        let client = client_with_secret("whsec_test");
        let payload = r#"{"id":"evt_1"}"#;
        let header = sign("whsec_test", "1700000000", payload);

        assert!(client.verify_webhook_signature(payload, &header).is_ok());
    }

    #[test]
    fn wrong_secret_rejected() {
        let client = client_with_secret("whsec_test");
        let payload = r#"{"id":"evt_1"}"#;
        let header = sign("whsec_other", "1700000000", payload);

        assert!(matches!(
            client.verify_webhook_signature(payload, &header),
            Err(StripeError::InvalidSignature)
        ));
    }

    #[test]
    fn tampered_payload_rejected() {
        let client = client_with_secret("whsec_test");
        let header = sign("whsec_test", "1700000000", r#"{"id":"evt_1"}"#);

        assert!(matches!(
            client.verify_webhook_signature(r#"{"id":"evt_2"}"#, &header),
            Err(StripeError::InvalidSignature)
        ));
    }

    #[test]
    fn missing_timestamp_rejected() {
        let client = client_with_secret("whsec_test");

        assert!(matches!(
            client.verify_webhook_signature("{}", "v1=deadbeef"),
            Err(StripeError::Configuration(_))
        ));
    }

    #[test]
    fn second_v1_candidate_accepted() {
        // Stripe sends multiple v1 entries during secret rotation.
        let client = client_with_secret("whsec_test");
        let payload = r#"{"id":"evt_1"}"#;
        let good = hmac_sha256_hex("whsec_test", &format!("1700000000.{payload}"));
        let header = format!("t=1700000000,v1=0000,v1={good}");

        assert!(client.verify_webhook_signature(payload, &header).is_ok());
    }

    #[test]
    fn no_secret_is_configuration_error() {
        let client = StripeClient::new("sk_test_xxx", None).unwrap();

        assert!(matches!(
            client.verify_webhook_signature("{}", "t=1,v1=00"),
            Err(StripeError::Configuration(_))
        ));
    }
}
