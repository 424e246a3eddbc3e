//! Subscription state sync.
//!
//! Mirrors processor subscription objects into local `SubscriptionRecord`
//! rows. The processor is the source of truth: every accepted event
//! overwrites all non-identity fields of the record, keyed by the processor
//! subscription id. No billing logic happens here.

use chrono::{DateTime, Utc};

use tally_core::{SubscriptionRecord, SubscriptionStatus, UserId};
use tally_store::{Result, Store};

use crate::stripe::StripeSubscription;

/// Lookup of local accounts by email, supplied by the surrounding platform.
///
/// Used as the last resort when a subscription cannot be attributed through
/// local records or processor metadata.
pub trait AccountDirectory: Send + Sync {
    /// Find the account id registered under `email`, if any.
    fn lookup_by_email(&self, email: &str) -> Option<UserId>;
}

/// Upsert a processor subscription object into the local mirror.
///
/// Owner resolution order: existing record, `metadata.user_id`, the customer
/// link index, then the account directory via `customer_email`. When no
/// owner can be resolved the event is logged and skipped; returns `None` in
/// that case, otherwise the stored record.
///
/// # Errors
///
/// Returns an error if a store operation fails.
pub fn upsert_from_processor(
    store: &dyn Store,
    subscription: &StripeSubscription,
    customer_email: Option<&str>,
    directory: Option<&dyn AccountDirectory>,
) -> Result<Option<SubscriptionRecord>> {
    let existing = store.get_subscription(&subscription.id)?;

    let Some(owner) = resolve_owner(store, subscription, existing.as_ref(), customer_email, directory)?
    else {
        tracing::warn!(
            subscription_id = %subscription.id,
            customer_id = %subscription.customer,
            "Cannot attribute subscription to a local account, skipping"
        );
        return Ok(None);
    };

    let status = SubscriptionStatus::parse(&subscription.status).unwrap_or_else(|| {
        tracing::warn!(
            subscription_id = %subscription.id,
            status = %subscription.status,
            "Unknown subscription status, recording as incomplete"
        );
        SubscriptionStatus::Incomplete
    });

    let first_item = subscription.items.data.first();
    let now = Utc::now();

    let record = SubscriptionRecord {
        subscription_id: subscription.id.clone(),
        owner,
        customer_id: subscription.customer.clone(),
        status,
        price_id: first_item
            .and_then(|i| i.price.as_ref())
            .map(|p| p.id.clone())
            .unwrap_or_default(),
        quantity: first_item.and_then(|i| i.quantity).unwrap_or(1),
        current_period_start: subscription.current_period_start.and_then(from_unix),
        current_period_end: subscription.current_period_end.and_then(from_unix),
        trial_end: subscription.trial_end.and_then(from_unix),
        cancel_at_period_end: subscription.cancel_at_period_end,
        canceled_at: subscription.canceled_at.and_then(from_unix),
        metadata: subscription.metadata.clone(),
        created_at: existing.as_ref().map_or(now, |e| e.created_at),
        updated_at: now,
    };

    store.put_subscription(&record)?;
    // Keep the customer link current so later events resolve directly.
    store.link_customer(&subscription.customer, &owner)?;

    tracing::info!(
        subscription_id = %record.subscription_id,
        owner = %record.owner,
        status = ?record.status,
        "Subscription state synced"
    );

    Ok(Some(record))
}

fn resolve_owner(
    store: &dyn Store,
    subscription: &StripeSubscription,
    existing: Option<&SubscriptionRecord>,
    customer_email: Option<&str>,
    directory: Option<&dyn AccountDirectory>,
) -> Result<Option<UserId>> {
    if let Some(record) = existing {
        return Ok(Some(record.owner));
    }

    if let Some(user_id) = subscription
        .metadata
        .get("user_id")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
    {
        return Ok(Some(user_id));
    }

    if let Some(owner) = store.owner_for_customer(&subscription.customer)? {
        return Ok(Some(owner));
    }

    if let (Some(email), Some(directory)) = (customer_email, directory) {
        if let Some(owner) = directory.lookup_by_email(email) {
            return Ok(Some(owner));
        }
    }

    Ok(None)
}

fn from_unix(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}
