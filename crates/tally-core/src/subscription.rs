//! Subscription state mirrored from the payment processor.
//!
//! Subscription records are pure mirrors: the processor is the source of
//! truth and every sync overwrites all non-identity fields. They carry no
//! ledger side effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Local mirror of one external subscription's lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Processor-assigned subscription id. Unique.
    pub subscription_id: String,

    /// The owning account.
    pub owner: UserId,

    /// Processor customer id the subscription belongs to.
    pub customer_id: String,

    /// Current lifecycle status.
    pub status: SubscriptionStatus,

    /// Processor price reference for the subscribed line item.
    pub price_id: String,

    /// Subscribed quantity.
    pub quantity: u32,

    /// Start of the current billing period.
    pub current_period_start: Option<DateTime<Utc>>,

    /// End of the current billing period.
    pub current_period_end: Option<DateTime<Utc>>,

    /// End of the trial period, if any.
    pub trial_end: Option<DateTime<Utc>>,

    /// Whether the subscription cancels at period end.
    pub cancel_at_period_end: bool,

    /// When the subscription was canceled, if it was.
    pub canceled_at: Option<DateTime<Utc>>,

    /// Processor-supplied metadata.
    pub metadata: serde_json::Value,

    /// When the local record was created.
    pub created_at: DateTime<Utc>,

    /// When the local record was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Subscription lifecycle status, mirroring the processor's states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// In trial period.
    Trialing,

    /// Active and paid.
    Active,

    /// Payment failed, within the retry window.
    PastDue,

    /// Canceled.
    Canceled,

    /// Retries exhausted, unpaid.
    Unpaid,

    /// Initial payment not yet completed.
    Incomplete,

    /// Initial payment window expired.
    IncompleteExpired,
}

impl SubscriptionStatus {
    /// Parse a processor status string.
    ///
    /// Returns `None` for unrecognized states so callers can log and skip
    /// rather than guess.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trialing" => Some(Self::Trialing),
            "active" => Some(Self::Active),
            "past_due" => Some(Self::PastDue),
            "canceled" => Some(Self::Canceled),
            "unpaid" => Some(Self::Unpaid),
            "incomplete" => Some(Self::Incomplete),
            "incomplete_expired" => Some(Self::IncompleteExpired),
            _ => None,
        }
    }
}
