//! Payment reconciliation service.
//!
//! Drives the local `PaymentRecord` state machine from two processor
//! signals: explicit confirmation calls and asynchronous webhook events.
//! Both paths converge on [`apply_intent_outcome`], and the at-most-once
//! wallet credit is enforced by the store's settle operation, so the two
//! signals can race freely.

use tally_core::{PaymentKind, PaymentRecord, PaymentStatus, ProcessorEvent, Transaction, UserId};
use tally_store::{Store, StoreError};

use crate::error::ApiError;
use crate::stripe::{PaymentIntent, StripeClient, StripeSubscription, WebhookEvent};
use crate::subscriptions::{self, AccountDirectory};

/// Points credited for a succeeded points purchase.
///
/// An explicit `points_amount` on the record wins; otherwise the charge
/// amount is converted with the configured multiplier.
#[must_use]
pub fn points_for(payment: &PaymentRecord, points_per_cent: i64) -> i64 {
    payment
        .points_amount
        .unwrap_or(payment.amount * points_per_cent)
}

/// Map a processor intent status to the local payment status.
///
/// Anything the processor still considers in flight maps to `Processing`;
/// unknown statuses map to `Failed` so a record never sticks in pending on
/// processor vocabulary drift.
#[must_use]
pub fn map_intent_status(status: &str) -> PaymentStatus {
    match status {
        "succeeded" => PaymentStatus::Succeeded,
        "processing" | "requires_action" | "requires_confirmation" | "requires_capture" => {
            PaymentStatus::Processing
        }
        "canceled" => PaymentStatus::Canceled,
        _ => PaymentStatus::Failed,
    }
}

/// The wallet credit due when `payment` settles, if any.
///
/// Only points purchases touch the ledger; subscription and one-time
/// payments settle without a credit.
#[must_use]
pub fn credit_for(payment: &PaymentRecord, points_per_cent: i64) -> Option<Transaction> {
    match payment.kind {
        PaymentKind::PointsPurchase => {
            let points = points_for(payment, points_per_cent);
            (points > 0).then(|| {
                Transaction::deposit(payment.owner, points, format!("payment_{}", payment.id))
            })
        }
        PaymentKind::Subscription | PaymentKind::OneTime => None,
    }
}

/// Apply a processor-reported intent status to the local record.
///
/// Succeeded settles the payment (crediting the wallet for points
/// purchases); in-flight statuses move it to processing; everything else
/// fails it. Settling an already-succeeded record is a no-op, and a move
/// that would leave a terminal status is refused by the store.
///
/// # Errors
///
/// Propagates store failures; `StoreError::TerminalState` surfaces when the
/// processor reports an outcome for a record that already reached a
/// different terminal status.
pub fn apply_intent_outcome(
    store: &dyn Store,
    payment: &PaymentRecord,
    intent_status: &str,
    points_per_cent: i64,
) -> Result<PaymentRecord, StoreError> {
    match map_intent_status(intent_status) {
        PaymentStatus::Succeeded => {
            let credit = credit_for(payment, points_per_cent);
            match store.settle_payment(&payment.id, credit.as_ref())? {
                Some(settled) => {
                    tracing::info!(
                        payment_id = %settled.id,
                        owner = %settled.owner,
                        points = credit.as_ref().map_or(0, |c| c.amount),
                        "Payment settled"
                    );
                    Ok(settled)
                }
                None => {
                    tracing::debug!(payment_id = %payment.id, "Payment already settled, no-op");
                    store
                        .get_payment(&payment.id)?
                        .ok_or_else(|| StoreError::NotFound {
                            entity: "payment",
                            id: payment.id.to_string(),
                        })
                }
            }
        }
        status => {
            tracing::info!(
                payment_id = %payment.id,
                intent_status = %intent_status,
                local_status = ?status,
                "Payment status updated from processor"
            );
            store.transition_payment(&payment.id, status)
        }
    }
}

/// Confirm a payment with the processor and reconcile the local record.
///
/// The caller names the exact intent to confirm; the record is looked up by
/// that intent id and must belong to the caller.
///
/// # Errors
///
/// - `ApiError::NotFound` if no payment carries the intent id or it belongs
///   to another account.
/// - `ApiError::ExternalService` if the processor call fails.
pub async fn confirm_payment(
    store: &dyn Store,
    stripe: &StripeClient,
    caller: UserId,
    intent_id: &str,
    points_per_cent: i64,
) -> Result<PaymentRecord, ApiError> {
    let payment = store
        .get_payment_by_intent(intent_id)?
        .filter(|p| p.owner == caller)
        .ok_or_else(|| ApiError::NotFound(format!("payment not found for intent {intent_id}")))?;

    // Already settled: idempotent success without a processor round-trip.
    if payment.status == PaymentStatus::Succeeded {
        return Ok(payment);
    }

    let intent = stripe.confirm_payment_intent(intent_id).await?;

    Ok(apply_intent_outcome(store, &payment, &intent.status, points_per_cent)?)
}

/// Handle a verified webhook event.
///
/// Callers verify the signature before this point. Events are deduplicated
/// by `event_id`: an already-processed event returns immediately. The event
/// record (with raw payload) is written before dispatch; after dispatch the
/// event is marked processed even when the handler failed on bad event
/// content, so a poison event cannot wedge the endpoint. Store failures
/// propagate unmarked and the processor will redeliver.
///
/// # Errors
///
/// Returns an error only when the event store itself fails.
pub async fn handle_webhook_event(
    store: &dyn Store,
    stripe: Option<&StripeClient>,
    directory: Option<&dyn AccountDirectory>,
    event: &WebhookEvent,
    raw_payload: serde_json::Value,
    points_per_cent: i64,
) -> Result<(), ApiError> {
    if let Some(existing) = store.get_event(&event.id)? {
        if existing.processed {
            tracing::info!(event_id = %event.id, "Duplicate webhook event, skipping");
            return Ok(());
        }
        // Recorded but unprocessed: a previous delivery died mid-flight,
        // fall through and retry the dispatch.
    } else {
        store.put_event(&ProcessorEvent::new(
            &event.id,
            &event.event_type,
            raw_payload,
        ))?;
    }

    let outcome = dispatch(store, stripe, directory, event, points_per_cent).await;

    match outcome {
        Ok(()) => {}
        Err(ApiError::Internal(msg)) => {
            // Storage trouble: leave the event unprocessed for redelivery.
            return Err(ApiError::Internal(msg));
        }
        Err(e) => {
            tracing::warn!(
                event_id = %event.id,
                event_type = %event.event_type,
                error = %e,
                "Webhook dispatch failed, marking event processed anyway"
            );
        }
    }

    store.mark_event_processed(&event.id)?;
    Ok(())
}

async fn dispatch(
    store: &dyn Store,
    stripe: Option<&StripeClient>,
    directory: Option<&dyn AccountDirectory>,
    event: &WebhookEvent,
    points_per_cent: i64,
) -> Result<(), ApiError> {
    match event.event_type.as_str() {
        "payment_intent.succeeded" | "payment_intent.payment_failed" | "payment_intent.canceled" => {
            handle_intent_event(store, event, points_per_cent)
        }
        "customer.subscription.created"
        | "customer.subscription.updated"
        | "customer.subscription.deleted" => {
            let subscription: StripeSubscription =
                serde_json::from_value(event.data.object.clone())
                    .map_err(|e| ApiError::BadRequest(format!("malformed subscription: {e}")))?;
            sync_subscription(store, stripe, directory, &subscription).await
        }
        "checkout.session.completed" => {
            handle_checkout_completed(store, stripe, directory, event).await
        }
        "invoice.payment_succeeded" | "invoice.payment_failed" => {
            handle_invoice_event(store, stripe, directory, event).await
        }
        other => {
            tracing::debug!(event_type = %other, "Unhandled webhook event");
            Ok(())
        }
    }
}

fn handle_intent_event(
    store: &dyn Store,
    event: &WebhookEvent,
    points_per_cent: i64,
) -> Result<(), ApiError> {
    let intent: PaymentIntent = serde_json::from_value(event.data.object.clone())
        .map_err(|e| ApiError::BadRequest(format!("malformed payment intent: {e}")))?;

    let Some(payment) = store.get_payment_by_intent(&intent.id)? else {
        // An intent created outside this service; nothing local to update.
        tracing::info!(
            intent_id = %intent.id,
            event_type = %event.event_type,
            "No local payment for intent, ignoring"
        );
        return Ok(());
    };

    apply_intent_outcome(store, &payment, &intent.status, points_per_cent)?;
    Ok(())
}

async fn handle_checkout_completed(
    store: &dyn Store,
    stripe: Option<&StripeClient>,
    directory: Option<&dyn AccountDirectory>,
    event: &WebhookEvent,
) -> Result<(), ApiError> {
    let object = &event.data.object;

    // Only subscription-mode sessions carry state we mirror; payment-mode
    // purchases are reconciled through their payment intent events.
    let mode = object.get("mode").and_then(|v| v.as_str()).unwrap_or("");
    let Some(subscription_id) = object.get("subscription").and_then(|v| v.as_str()) else {
        tracing::debug!(mode = %mode, "Checkout session without subscription, ignoring");
        return Ok(());
    };

    sync_subscription_by_id(store, stripe, directory, subscription_id).await
}

async fn handle_invoice_event(
    store: &dyn Store,
    stripe: Option<&StripeClient>,
    directory: Option<&dyn AccountDirectory>,
    event: &WebhookEvent,
) -> Result<(), ApiError> {
    let Some(subscription_id) = event
        .data
        .object
        .get("subscription")
        .and_then(|v| v.as_str())
    else {
        tracing::debug!(event_type = %event.event_type, "Invoice without subscription, ignoring");
        return Ok(());
    };

    sync_subscription_by_id(store, stripe, directory, subscription_id).await
}

async fn sync_subscription_by_id(
    store: &dyn Store,
    stripe: Option<&StripeClient>,
    directory: Option<&dyn AccountDirectory>,
    subscription_id: &str,
) -> Result<(), ApiError> {
    let Some(client) = stripe else {
        tracing::warn!(
            subscription_id = %subscription_id,
            "Stripe client not configured, cannot refresh subscription"
        );
        return Ok(());
    };

    let subscription = client.retrieve_subscription(subscription_id).await?;
    sync_subscription(store, stripe, directory, &subscription).await
}

/// Upsert a subscription, falling back to the processor customer's email
/// when local owner resolution fails.
///
/// The email fetch costs a processor round-trip, so it runs only after the
/// local resolution chain (record, metadata, customer link) came up empty.
async fn sync_subscription(
    store: &dyn Store,
    stripe: Option<&StripeClient>,
    directory: Option<&dyn AccountDirectory>,
    subscription: &StripeSubscription,
) -> Result<(), ApiError> {
    if subscriptions::upsert_from_processor(store, subscription, None, None)?.is_some() {
        return Ok(());
    }

    let (Some(client), Some(directory)) = (stripe, directory) else {
        return Ok(());
    };

    let email = client
        .get_customer(&subscription.customer)
        .await?
        .and_then(|c| c.email);
    let Some(email) = email else {
        tracing::warn!(
            subscription_id = %subscription.id,
            customer_id = %subscription.customer,
            "Processor customer has no email, subscription stays unattributed"
        );
        return Ok(());
    };

    subscriptions::upsert_from_processor(store, subscription, Some(&email), Some(directory))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tally_store::RocksStore;
    use tempfile::TempDir;

    fn create_store() -> (Arc<RocksStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        (Arc::new(RocksStore::open(dir.path()).unwrap()), dir)
    }

    fn points_payment(owner: UserId, amount: i64, points: Option<i64>) -> PaymentRecord {
        let mut p = PaymentRecord::new(
            owner,
            amount,
            "usd",
            PaymentKind::PointsPurchase,
            "Purchase points",
        );
        p.points_amount = points;
        p.intent_id = Some(format!("pi_{}", p.id));
        p
    }

    #[test]
    fn explicit_points_amount_wins() {
        let p = points_payment(UserId::generate(), 1000, Some(2500));
        assert_eq!(points_for(&p, 1), 2500);
        assert_eq!(points_for(&p, 100), 2500);
    }

    #[test]
    fn derived_points_use_multiplier() {
        let p = points_payment(UserId::generate(), 1000, None);
        assert_eq!(points_for(&p, 1), 1000);
        assert_eq!(points_for(&p, 100), 100_000);
    }

    #[test]
    fn intent_status_mapping() {
        assert_eq!(map_intent_status("succeeded"), PaymentStatus::Succeeded);
        assert_eq!(map_intent_status("processing"), PaymentStatus::Processing);
        assert_eq!(
            map_intent_status("requires_action"),
            PaymentStatus::Processing
        );
        assert_eq!(map_intent_status("canceled"), PaymentStatus::Canceled);
        assert_eq!(map_intent_status("mystery"), PaymentStatus::Failed);
    }

    #[test]
    fn no_credit_for_subscription_payments() {
        let owner = UserId::generate();
        let p = PaymentRecord::new(owner, 999, "usd", PaymentKind::Subscription, "Monthly");
        assert!(credit_for(&p, 1).is_none());
    }

    #[test]
    fn succeeded_outcome_settles_and_credits() {
        let (store, _dir) = create_store();
        let owner = UserId::generate();
        let payment = points_payment(owner, 1000, None);
        store.put_payment(&payment).unwrap();

        let settled = apply_intent_outcome(store.as_ref(), &payment, "succeeded", 1).unwrap();
        assert_eq!(settled.status, PaymentStatus::Succeeded);
        assert_eq!(store.get_wallet(&owner).unwrap().unwrap().balance, 1000);

        // A second succeeded signal (confirm vs webhook race) is a no-op.
        let again = apply_intent_outcome(store.as_ref(), &payment, "succeeded", 1).unwrap();
        assert_eq!(again.status, PaymentStatus::Succeeded);
        assert_eq!(store.get_wallet(&owner).unwrap().unwrap().balance, 1000);
    }

    #[test]
    fn in_flight_outcome_moves_to_processing() {
        let (store, _dir) = create_store();
        let payment = points_payment(UserId::generate(), 1000, None);
        store.put_payment(&payment).unwrap();

        let updated =
            apply_intent_outcome(store.as_ref(), &payment, "requires_action", 1).unwrap();
        assert_eq!(updated.status, PaymentStatus::Processing);

        // Still settleable afterwards.
        let settled = apply_intent_outcome(store.as_ref(), &payment, "succeeded", 1).unwrap();
        assert_eq!(settled.status, PaymentStatus::Succeeded);
    }

    #[test]
    fn unknown_outcome_fails_payment_without_credit() {
        let (store, _dir) = create_store();
        let owner = UserId::generate();
        let payment = points_payment(owner, 1000, None);
        store.put_payment(&payment).unwrap();

        let updated = apply_intent_outcome(store.as_ref(), &payment, "mystery", 1).unwrap();
        assert_eq!(updated.status, PaymentStatus::Failed);
        assert!(store.get_wallet(&owner).unwrap().is_none());
    }

    fn intent_event(event_id: &str, event_type: &str, intent_id: &str, status: &str) -> WebhookEvent {
        serde_json::from_value(serde_json::json!({
            "id": event_id,
            "type": event_type,
            "created": 1_700_000_000,
            "data": {"object": {"id": intent_id, "status": status, "amount": 1000, "currency": "usd"}}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn webhook_event_dedupe() {
        let (store, _dir) = create_store();
        let owner = UserId::generate();
        let payment = points_payment(owner, 1000, None);
        let intent_id = payment.intent_id.clone().unwrap();
        store.put_payment(&payment).unwrap();

        let event = intent_event("evt_1", "payment_intent.succeeded", &intent_id, "succeeded");
        let raw = serde_json::json!({"id": "evt_1"});

        handle_webhook_event(store.as_ref(), None, None, &event, raw.clone(), 1)
            .await
            .unwrap();
        assert_eq!(store.get_wallet(&owner).unwrap().unwrap().balance, 1000);
        assert!(store.get_event("evt_1").unwrap().unwrap().processed);

        // Redelivery of the same event id does nothing.
        handle_webhook_event(store.as_ref(), None, None, &event, raw, 1)
            .await
            .unwrap();
        assert_eq!(store.get_wallet(&owner).unwrap().unwrap().balance, 1000);
    }

    #[tokio::test]
    async fn unknown_intent_is_marked_processed() {
        let (store, _dir) = create_store();

        let event = intent_event(
            "evt_2",
            "payment_intent.succeeded",
            "pi_created_elsewhere",
            "succeeded",
        );
        handle_webhook_event(store.as_ref(), None, None, &event, serde_json::json!({}), 1)
            .await
            .unwrap();

        assert!(store.get_event("evt_2").unwrap().unwrap().processed);
    }

    #[tokio::test]
    async fn failed_intent_event_marks_payment_failed() {
        let (store, _dir) = create_store();
        let owner = UserId::generate();
        let payment = points_payment(owner, 1000, None);
        let intent_id = payment.intent_id.clone().unwrap();
        store.put_payment(&payment).unwrap();

        let event = intent_event(
            "evt_3",
            "payment_intent.payment_failed",
            &intent_id,
            "requires_payment_method",
        );
        handle_webhook_event(store.as_ref(), None, None, &event, serde_json::json!({}), 1)
            .await
            .unwrap();

        let stored = store.get_payment(&payment.id).unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);
        assert!(store.get_wallet(&owner).unwrap().is_none());
    }

    #[tokio::test]
    async fn subscription_event_upserts_record() {
        let (store, _dir) = create_store();
        let owner = UserId::generate();
        store.link_customer("cus_9", &owner).unwrap();

        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_4",
            "type": "customer.subscription.updated",
            "created": 1_700_000_000,
            "data": {"object": {
                "id": "sub_9",
                "customer": "cus_9",
                "status": "active",
                "cancel_at_period_end": false,
                "items": {"data": [{"price": {"id": "price_1"}, "quantity": 2}]},
                "metadata": {}
            }}
        }))
        .unwrap();

        handle_webhook_event(store.as_ref(), None, None, &event, serde_json::json!({}), 1)
            .await
            .unwrap();

        let record = store.get_subscription("sub_9").unwrap().unwrap();
        assert_eq!(record.owner, owner);
        assert_eq!(record.quantity, 2);
    }
}
