//! `RocksDB` storage layer for tally.
//!
//! This crate provides persistent storage for wallets, ledger transactions,
//! payment records, processor events, and subscriptions using `RocksDB` with
//! column families for efficient indexing.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `wallets`: Wallet records, keyed by owner id
//! - `transactions`: Ledger transactions, keyed by `transaction_id` (ULID)
//! - `transactions_by_wallet`: Index for listing transactions per wallet
//! - `payments`: Payment records, keyed by `payment_id`
//! - `payments_by_intent`: Index from processor intent id to `payment_id`
//! - `processor_events`: Webhook events for idempotency, keyed by `event_id`
//! - `subscriptions`: Subscription records, keyed by processor subscription id
//! - `customer_links`: Index from processor customer id to owner id
//!
//! # Atomicity
//!
//! Balance mutations commit the wallet update and its transaction record in
//! one `WriteBatch`, serialized per wallet by a striped lock table, so the
//! wallet balance always equals the signed sum of its transactions. Payment
//! status transitions are serialized per payment the same way.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use tally_core::{
    PaymentId, PaymentRecord, PaymentStatus, ProcessorEvent, SubscriptionRecord, Transaction,
    TransactionId, UserId, Wallet,
};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations (e.g. `RocksDB`, in-memory for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Wallet Operations
    // =========================================================================

    /// Get a wallet by owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_wallet(&self, owner: &UserId) -> Result<Option<Wallet>>;

    /// Get the wallet for an owner, creating it with zero balance if absent.
    ///
    /// Safe under concurrent first access: at most one wallet is ever
    /// created per owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_or_create_wallet(&self, owner: &UserId) -> Result<Wallet>;

    /// Apply a ledger transaction to its owner's wallet atomically.
    ///
    /// This is the single atomic unit of the ledger: read the balance,
    /// validate, write the new balance, and append the transaction record,
    /// with no other mutation to the same wallet interleaved. The wallet is
    /// created lazily if it does not exist. Returns the new balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidAmount` if `transaction.amount <= 0`.
    /// - `StoreError::InsufficientBalance` if a deduct exceeds the balance.
    ///
    /// Both failures leave the wallet and transaction log unchanged.
    fn apply_transaction(&self, transaction: &Transaction) -> Result<i64>;

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>>;

    /// List transactions for a wallet, ordered by time (newest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions(
        &self,
        owner: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>>;

    // =========================================================================
    // Payment Operations
    // =========================================================================

    /// Insert or update a payment record.
    ///
    /// Maintains the intent index and the customer link when the record
    /// carries those ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_payment(&self, payment: &PaymentRecord) -> Result<()>;

    /// Get a payment by its local ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_payment(&self, payment_id: &PaymentId) -> Result<Option<PaymentRecord>>;

    /// Get a payment by its processor intent id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_payment_by_intent(&self, intent_id: &str) -> Result<Option<PaymentRecord>>;

    /// List an owner's payment records, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_payments(&self, owner: &UserId, limit: usize, offset: usize)
        -> Result<Vec<PaymentRecord>>;

    /// Settle a payment: transition it to succeeded, stamp `completed_at`,
    /// and apply the wallet credit (when one is due) in the same atomic
    /// commit.
    ///
    /// Returns `None` without touching anything if the payment has already
    /// succeeded, so concurrent confirm/webhook signals credit at most once.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the payment does not exist.
    /// - `StoreError::TerminalState` if the payment is failed or canceled.
    fn settle_payment(
        &self,
        payment_id: &PaymentId,
        credit: Option<&Transaction>,
    ) -> Result<Option<PaymentRecord>>;

    /// Transition a payment to a non-succeeded status (processing, failed,
    /// canceled), serialized against other writers of the same payment.
    ///
    /// A transition to the payment's current status is a no-op.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the payment does not exist.
    /// - `StoreError::TerminalState` if the move would leave a terminal
    ///   status.
    fn transition_payment(
        &self,
        payment_id: &PaymentId,
        status: PaymentStatus,
    ) -> Result<PaymentRecord>;

    // =========================================================================
    // Processor Event Operations (webhook idempotency)
    // =========================================================================

    /// Get a processor event by its event id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_event(&self, event_id: &str) -> Result<Option<ProcessorEvent>>;

    /// Record a processor event.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_event(&self, event: &ProcessorEvent) -> Result<()>;

    /// Mark a processor event as processed with the current timestamp.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the event was never recorded.
    fn mark_event_processed(&self, event_id: &str) -> Result<()>;

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Insert or overwrite a subscription record (upsert keyed by
    /// `subscription_id`).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_subscription(&self, subscription: &SubscriptionRecord) -> Result<()>;

    /// Get a subscription by its processor subscription id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_subscription(&self, subscription_id: &str) -> Result<Option<SubscriptionRecord>>;

    // =========================================================================
    // Customer Link Operations
    // =========================================================================

    /// Record which local account a processor customer id belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn link_customer(&self, customer_id: &str, owner: &UserId) -> Result<()>;

    /// Look up the local account for a processor customer id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn owner_for_customer(&self, customer_id: &str) -> Result<Option<UserId>>;
}
