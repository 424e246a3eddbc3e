//! Wallet types for tally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// A per-account durable balance record.
///
/// One wallet exists per account, created lazily on first use. The balance
/// is stored in integer minor units (points) to avoid floating-point drift;
/// display-decimal conversion happens only at the API boundary.
///
/// The non-negative balance invariant is enforced by the ledger layer, not
/// here: a wallet only ever changes through an atomic balance-plus-transaction
/// commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// The owning account.
    pub owner: UserId,

    /// Current balance in minor units.
    pub balance: i64,

    /// When the wallet was created.
    pub created_at: DateTime<Utc>,

    /// When the wallet was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create a new wallet with zero balance.
    #[must_use]
    pub fn new(owner: UserId) -> Self {
        let now = Utc::now();
        Self {
            owner,
            balance: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether the wallet can cover a deduction.
    #[must_use]
    pub fn has_sufficient_balance(&self, amount: i64) -> bool {
        self.balance >= amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_wallet_has_zero_balance() {
        let owner = UserId::generate();
        let wallet = Wallet::new(owner);
        assert_eq!(wallet.balance, 0);
        assert_eq!(wallet.owner, owner);
    }

    #[test]
    fn sufficient_balance_boundary() {
        let mut wallet = Wallet::new(UserId::generate());
        wallet.balance = 1000;

        assert!(wallet.has_sufficient_balance(500));
        assert!(wallet.has_sufficient_balance(1000));
        assert!(!wallet.has_sufficient_balance(1001));
    }
}
