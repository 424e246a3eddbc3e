//! Payment creation, confirmation, and history handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use tally_core::{PaymentId, PaymentKind, PaymentRecord, PaymentStatus};
use tally_store::Store;

use crate::error::ApiError;
use crate::identity::Caller;
use crate::reconcile;
use crate::state::AppState;

/// Minimum chargeable amount in minor units.
const MIN_AMOUNT: i64 = 50;

/// Maximum chargeable amount in minor units.
const MAX_AMOUNT: i64 = 1_000_000;

/// Create payment intent request.
#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    /// Amount to charge in minor units.
    pub amount: i64,
    /// ISO currency code (default: "usd").
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Explicit points to credit on success. When absent, derived from the
    /// amount via the configured multiplier.
    #[serde(default)]
    pub points_amount: Option<i64>,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
}

fn default_currency() -> String {
    "usd".into()
}

/// Create payment intent response.
#[derive(Debug, Serialize)]
pub struct CreateIntentResponse {
    /// Local payment record id.
    pub payment_id: String,
    /// Processor intent id.
    pub intent_id: String,
    /// Client secret for the frontend payment flow.
    pub client_secret: Option<String>,
    /// Points that will be credited on success.
    pub points_amount: i64,
}

/// Create a payment intent for a points purchase.
///
/// Creates the local pending record first, then the processor customer and
/// intent. If the processor call fails the record is kept with status
/// failed for audit.
pub async fn create_intent(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(body): Json<CreateIntentRequest>,
) -> Result<Json<CreateIntentResponse>, ApiError> {
    if body.amount < MIN_AMOUNT {
        return Err(ApiError::BadRequest(format!(
            "minimum amount is {MIN_AMOUNT}"
        )));
    }
    if body.amount > MAX_AMOUNT {
        return Err(ApiError::BadRequest(format!(
            "maximum amount is {MAX_AMOUNT}"
        )));
    }
    if matches!(body.points_amount, Some(p) if p <= 0) {
        return Err(ApiError::BadRequest("points_amount must be positive".into()));
    }

    let stripe = state
        .stripe
        .as_ref()
        .ok_or_else(|| ApiError::ExternalService("Stripe not configured".into()))?;

    let description = body
        .description
        .unwrap_or_else(|| "Points purchase".to_string());

    let mut payment = PaymentRecord::new(
        caller.user_id,
        body.amount,
        body.currency.to_lowercase(),
        PaymentKind::PointsPurchase,
        description.clone(),
    );
    payment.points_amount = body.points_amount;
    state.store.put_payment(&payment)?;

    let user_id = caller.user_id.to_string();
    let outcome = async {
        let customer = stripe.create_customer(&user_id, None, None).await?;
        let intent = stripe
            .create_payment_intent(
                &customer.id,
                payment.amount,
                &payment.currency,
                &description,
                &user_id,
            )
            .await?;
        Ok::<_, crate::stripe::StripeError>((customer, intent))
    }
    .await;

    let (customer, intent) = match outcome {
        Ok(pair) => pair,
        Err(e) => {
            // Keep the record for audit, marked failed.
            tracing::error!(
                payment_id = %payment.id,
                error = %e,
                "Processor rejected intent creation"
            );
            state
                .store
                .transition_payment(&payment.id, PaymentStatus::Failed)?;
            return Err(e.into());
        }
    };

    payment.intent_id = Some(intent.id.clone());
    payment.customer_id = Some(customer.id);
    state.store.put_payment(&payment)?;

    tracing::info!(
        user_id = %user_id,
        payment_id = %payment.id,
        intent_id = %intent.id,
        amount = %payment.amount,
        "Payment intent created"
    );

    Ok(Json(CreateIntentResponse {
        payment_id: payment.id.to_string(),
        intent_id: intent.id,
        client_secret: intent.client_secret,
        points_amount: reconcile::points_for(&payment, state.config.points_per_cent),
    }))
}

/// Confirm payment request.
#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    /// The processor intent id to confirm.
    pub intent_id: String,
}

/// Payment response.
#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    /// Local payment record id.
    pub id: String,
    /// Amount in minor units.
    pub amount: i64,
    /// Currency.
    pub currency: String,
    /// Kind.
    pub kind: String,
    /// Status.
    pub status: String,
    /// Processor intent id.
    pub intent_id: Option<String>,
    /// Points credited on success.
    pub points_amount: Option<i64>,
    /// Description.
    pub description: String,
    /// Created timestamp (ISO 8601).
    pub created_at: String,
    /// Completed timestamp (ISO 8601).
    pub completed_at: Option<String>,
}

impl From<&PaymentRecord> for PaymentResponse {
    fn from(p: &PaymentRecord) -> Self {
        Self {
            id: p.id.to_string(),
            amount: p.amount,
            currency: p.currency.clone(),
            kind: match p.kind {
                PaymentKind::PointsPurchase => "points_purchase".into(),
                PaymentKind::Subscription => "subscription".into(),
                PaymentKind::OneTime => "one_time".into(),
            },
            status: format!("{:?}", p.status).to_lowercase(),
            intent_id: p.intent_id.clone(),
            points_amount: p.points_amount,
            description: p.description.clone(),
            created_at: p.created_at.to_rfc3339(),
            completed_at: p.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Confirm a payment by its processor intent id.
pub async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(body): Json<ConfirmPaymentRequest>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let stripe = state
        .stripe
        .as_ref()
        .ok_or_else(|| ApiError::ExternalService("Stripe not configured".into()))?;

    let payment = reconcile::confirm_payment(
        state.store.as_ref(),
        stripe,
        caller.user_id,
        &body.intent_id,
        state.config.points_per_cent,
    )
    .await?;

    Ok(Json(PaymentResponse::from(&payment)))
}

/// Payment list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListPaymentsQuery {
    /// Maximum number of payments to return (default: 20).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

/// List payments response.
#[derive(Debug, Serialize)]
pub struct ListPaymentsResponse {
    /// Payments (newest first).
    pub payments: Vec<PaymentResponse>,
}

/// List the caller's payment history.
pub async fn list_payments(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<ListPaymentsResponse>, ApiError> {
    let payments = state
        .store
        .list_payments(&caller.user_id, query.limit.min(100), query.offset)?;

    Ok(Json(ListPaymentsResponse {
        payments: payments.iter().map(PaymentResponse::from).collect(),
    }))
}

/// Get a single payment record.
pub async fn get_payment(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(payment_id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment_id: PaymentId = payment_id
        .parse()
        .map_err(|_| ApiError::BadRequest("invalid payment id".into()))?;

    let payment = state
        .store
        .get_payment(&payment_id)?
        .filter(|p| p.owner == caller.user_id)
        .ok_or_else(|| ApiError::NotFound(format!("payment not found: {payment_id}")))?;

    Ok(Json(PaymentResponse::from(&payment)))
}
