//! Stripe API types.

use serde::Deserialize;

/// Stripe customer object.
#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    /// Stripe customer ID.
    pub id: String,
    /// Customer email.
    #[serde(default)]
    pub email: Option<String>,
    /// Customer name.
    #[serde(default)]
    pub name: Option<String>,
    /// Metadata attached to the customer.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Created timestamp (Unix).
    #[serde(default)]
    pub created: i64,
}

/// Stripe `PaymentIntent` object.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    /// Payment intent ID.
    pub id: String,
    /// Amount in minor units.
    #[serde(default)]
    pub amount: i64,
    /// Currency (e.g., "usd").
    #[serde(default)]
    pub currency: String,
    /// Status (succeeded, processing, `requires_action`, canceled, ...).
    #[serde(default)]
    pub status: String,
    /// Customer ID.
    #[serde(default)]
    pub customer: Option<String>,
    /// Client secret for the frontend payment flow.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Created timestamp (Unix).
    #[serde(default)]
    pub created: i64,
    /// Metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Stripe subscription object.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    /// Subscription ID.
    pub id: String,
    /// Customer ID.
    #[serde(default)]
    pub customer: String,
    /// Status (active, trialing, `past_due`, canceled, ...).
    #[serde(default)]
    pub status: String,
    /// Current period start (Unix).
    #[serde(default)]
    pub current_period_start: Option<i64>,
    /// Current period end (Unix).
    #[serde(default)]
    pub current_period_end: Option<i64>,
    /// Trial end (Unix).
    #[serde(default)]
    pub trial_end: Option<i64>,
    /// Whether the subscription cancels at period end.
    #[serde(default)]
    pub cancel_at_period_end: bool,
    /// When the subscription was canceled (Unix).
    #[serde(default)]
    pub canceled_at: Option<i64>,
    /// Subscription items.
    #[serde(default)]
    pub items: SubscriptionItemList,
    /// Metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Subscription item list wrapper.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItemList {
    /// Items.
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

/// A single subscription item.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    /// Price attached to the item.
    #[serde(default)]
    pub price: Option<SubscriptionPrice>,
    /// Quantity.
    #[serde(default)]
    pub quantity: Option<u32>,
}

/// Price reference on a subscription item.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionPrice {
    /// Price ID.
    pub id: String,
}

/// Stripe webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event ID.
    pub id: String,
    /// Event type (e.g., "payment_intent.succeeded").
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event data.
    pub data: WebhookEventData,
    /// Created timestamp (Unix).
    #[serde(default)]
    pub created: i64,
}

/// Webhook event data container.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    /// The event object.
    pub object: serde_json::Value,
}

/// Stripe API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorResponse {
    /// Error details.
    pub error: StripeErrorDetail,
}

/// Stripe error detail.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorDetail {
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message.
    pub message: String,
    /// Error code.
    #[serde(default)]
    pub code: Option<String>,
}
