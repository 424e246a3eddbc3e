//! Ledger transaction types for tally.
//!
//! Every balance change creates an immutable transaction record. The signed
//! sum of a wallet's transactions equals the wallet's balance at all times.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TransactionId, UserId};

/// An immutable record of one balance-affecting event.
///
/// Transactions are write-once: they are never mutated or deleted after the
/// atomic commit that created them. `amount` is strictly positive; the sign
/// is derived from `kind` via [`Transaction::signed_amount`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The account whose wallet was affected.
    pub owner: UserId,

    /// Kind of balance change.
    pub kind: TransactionKind,

    /// Amount in minor units. Always positive; sign comes from `kind`.
    pub amount: i64,

    /// External correlation id (e.g. a processor payment id or tool-run id).
    ///
    /// Free text, used for audit and as a dedupe hint when paired with
    /// `kind`. Not guaranteed unique at the storage level.
    pub reference: String,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new deposit transaction.
    #[must_use]
    pub fn deposit(owner: UserId, amount: i64, reference: impl Into<String>) -> Self {
        Self::new(owner, TransactionKind::Deposit, amount, reference)
    }

    /// Create a new deduct transaction.
    #[must_use]
    pub fn deduct(owner: UserId, amount: i64, reference: impl Into<String>) -> Self {
        Self::new(owner, TransactionKind::Deduct, amount, reference)
    }

    /// Create a new refund transaction.
    ///
    /// Semantically a deposit, tagged separately for audit distinction.
    #[must_use]
    pub fn refund(owner: UserId, amount: i64, reference: impl Into<String>) -> Self {
        Self::new(owner, TransactionKind::Refund, amount, reference)
    }

    fn new(
        owner: UserId,
        kind: TransactionKind,
        amount: i64,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            owner,
            kind,
            amount,
            reference: reference.into(),
            created_at: Utc::now(),
        }
    }

    /// The balance delta this transaction applies: positive for
    /// deposit/refund, negative for deduct.
    #[must_use]
    pub const fn signed_amount(&self) -> i64 {
        match self.kind {
            TransactionKind::Deposit | TransactionKind::Refund => self.amount,
            TransactionKind::Deduct => -self.amount,
        }
    }
}

/// Kind of ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Balance credited (purchase, grant).
    Deposit,

    /// Balance debited (usage, tool run).
    Deduct,

    /// Balance credited back after a reversal.
    Refund,
}

impl TransactionKind {
    /// Check if this kind adds balance.
    #[must_use]
    pub const fn is_credit(self) -> bool {
        matches!(self, Self::Deposit | Self::Refund)
    }

    /// Check if this kind removes balance.
    #[must_use]
    pub const fn is_debit(self) -> bool {
        matches!(self, Self::Deduct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_transaction() {
        let owner = UserId::generate();
        let tx = Transaction::deposit(owner, 5000, "payment_abc");

        assert_eq!(tx.kind, TransactionKind::Deposit);
        assert_eq!(tx.amount, 5000);
        assert_eq!(tx.signed_amount(), 5000);
        assert_eq!(tx.reference, "payment_abc");
    }

    #[test]
    fn deduct_is_signed_negative() {
        let owner = UserId::generate();
        let tx = Transaction::deduct(owner, 100, "tool-run-1");

        assert_eq!(tx.kind, TransactionKind::Deduct);
        assert_eq!(tx.amount, 100); // Stored positive
        assert_eq!(tx.signed_amount(), -100);
    }

    #[test]
    fn refund_is_credit() {
        let owner = UserId::generate();
        let tx = Transaction::refund(owner, 250, "payment_abc");

        assert_eq!(tx.kind, TransactionKind::Refund);
        assert_eq!(tx.signed_amount(), 250);
    }

    #[test]
    fn kind_credit_debit() {
        assert!(TransactionKind::Deposit.is_credit());
        assert!(TransactionKind::Refund.is_credit());
        assert!(!TransactionKind::Deduct.is_credit());

        assert!(TransactionKind::Deduct.is_debit());
        assert!(!TransactionKind::Deposit.is_debit());
    }
}
