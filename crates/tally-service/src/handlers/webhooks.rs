//! Webhook handler for the payment processor.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use crate::error::ApiError;
use crate::reconcile;
use crate::state::AppState;
use crate::stripe::WebhookEvent;

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was accepted.
    pub received: bool,
}

/// Handle Stripe webhooks.
///
/// The signature is verified against the raw body before anything is parsed
/// or stored; an invalid or missing signature is rejected with 400. Once the
/// event is durably recorded, the endpoint acknowledges with 200 even when
/// per-event processing failed on event content.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    let stripe = state
        .stripe
        .as_ref()
        .ok_or_else(|| ApiError::ExternalService("Stripe not configured".into()))?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing Stripe signature".into()))?;

    stripe.verify_webhook_signature(&body, signature).map_err(|e| {
        tracing::warn!(error = %e, "Invalid Stripe webhook signature");
        ApiError::InvalidSignature
    })?;

    let event: WebhookEvent =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let raw_payload: serde_json::Value =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        event_type = %event.event_type,
        event_id = %event.id,
        "Received Stripe webhook"
    );

    reconcile::handle_webhook_event(
        state.store.as_ref(),
        state.stripe.as_deref(),
        state.directory.as_deref(),
        &event,
        raw_payload,
        state.config.points_per_cent,
    )
    .await?;

    Ok(Json(WebhookResponse { received: true }))
}
