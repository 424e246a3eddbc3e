//! Payment record types for tally.
//!
//! A `PaymentRecord` is the local mirror of one external payment attempt's
//! lifecycle. Reconciliation moves it through its status machine and, for
//! points purchases, credits the wallet exactly once at the succeeded
//! transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PaymentId, UserId};

/// Local mirror of one external payment attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Local payment ID.
    pub id: PaymentId,

    /// The paying account.
    pub owner: UserId,

    /// Charge amount in minor units of `currency`.
    pub amount: i64,

    /// ISO currency code (e.g. "usd").
    pub currency: String,

    /// What the payment is for.
    pub kind: PaymentKind,

    /// Current lifecycle status.
    pub status: PaymentStatus,

    /// Processor-assigned payment intent id. Unique when present.
    pub intent_id: Option<String>,

    /// Processor customer id, when known.
    pub customer_id: Option<String>,

    /// Points credited on success. When absent, the credit is derived from
    /// `amount` via the configured conversion multiplier.
    pub points_amount: Option<i64>,

    /// Human-readable description.
    pub description: String,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,

    /// Set exactly once, at the succeeded transition.
    pub completed_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    /// Create a new pending payment record.
    #[must_use]
    pub fn new(
        owner: UserId,
        amount: i64,
        currency: impl Into<String>,
        kind: PaymentKind,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::generate(),
            owner,
            amount,
            currency: currency.into(),
            kind,
            status: PaymentStatus::Pending,
            intent_id: None,
            customer_id: None,
            points_amount: None,
            description: description.into(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Check if the payment has succeeded.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.status == PaymentStatus::Succeeded
    }
}

/// What a payment is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    /// Purchase of wallet points.
    PointsPurchase,

    /// Recurring subscription charge.
    Subscription,

    /// One-time payment with no ledger effect.
    OneTime,
}

/// Lifecycle status of a payment.
///
/// Transitions are monotonic: once a payment reaches a terminal status it
/// never leaves it. The store enforces this on every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Created locally, processor not yet resolved.
    Pending,

    /// Processor reported an intermediate state (e.g. requires action).
    Processing,

    /// Processor confirmed the charge. Terminal.
    Succeeded,

    /// Processor rejected the charge. Terminal.
    Failed,

    /// Canceled before completion. Terminal.
    Canceled,

    /// Refunded after success.
    Refunded,
}

impl PaymentStatus {
    /// Whether this status is terminal for the payment lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    /// Whether a transition from `self` to `next` is permitted.
    ///
    /// Terminal states admit no transitions except succeeded → refunded.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending | Self::Processing => true,
            Self::Succeeded => matches!(next, Self::Refunded),
            Self::Failed | Self::Canceled | Self::Refunded => false,
        }
    }
}
