//! Balance ledger service.
//!
//! Thin domain layer over the store: validates amounts, constructs the
//! transaction records, and delegates the atomic balance mutation to
//! [`Store::apply_transaction`]. Every balance change goes through here or
//! through payment settlement; nothing else writes wallets.

use std::sync::Arc;

use tally_core::{Transaction, UserId, Wallet};
use tally_store::{Result, Store, StoreError};

/// The balance ledger service.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    /// Create a new ledger over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Get the wallet for an account, creating it with zero balance if
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn get_or_create_wallet(&self, owner: &UserId) -> Result<Wallet> {
        self.store.get_or_create_wallet(owner)
    }

    /// Current balance for an account. A missing wallet reads as zero and is
    /// not created.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn balance(&self, owner: &UserId) -> Result<i64> {
        Ok(self.store.get_wallet(owner)?.map_or(0, |w| w.balance))
    }

    /// Credit an account. Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidAmount` if `amount <= 0`.
    pub fn deposit(&self, owner: &UserId, amount: i64, reference: &str) -> Result<i64> {
        Self::validate_amount(amount)?;
        self.store
            .apply_transaction(&Transaction::deposit(*owner, amount, reference))
    }

    /// Debit an account. Returns the new balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidAmount` if `amount <= 0`.
    /// - `StoreError::InsufficientBalance` if the wallet cannot cover the
    ///   amount; the wallet is left unchanged.
    pub fn deduct(&self, owner: &UserId, amount: i64, reference: &str) -> Result<i64> {
        Self::validate_amount(amount)?;
        self.store
            .apply_transaction(&Transaction::deduct(*owner, amount, reference))
    }

    /// Credit an account back after a reversal. Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidAmount` if `amount <= 0`.
    pub fn refund(&self, owner: &UserId, amount: i64, reference: &str) -> Result<i64> {
        Self::validate_amount(amount)?;
        self.store
            .apply_transaction(&Transaction::refund(*owner, amount, reference))
    }

    /// List an account's transactions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn transactions(
        &self,
        owner: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        self.store.list_transactions(owner, limit, offset)
    }

    fn validate_amount(amount: i64) -> Result<()> {
        if amount <= 0 {
            return Err(StoreError::InvalidAmount(amount));
        }
        Ok(())
    }
}
