//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Wallet records, keyed by owner `UserId`.
    pub const WALLETS: &str = "wallets";

    /// Ledger transactions, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by wallet, keyed by `owner || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_WALLET: &str = "transactions_by_wallet";

    /// Payment records, keyed by `payment_id` (UUID).
    pub const PAYMENTS: &str = "payments";

    /// Index: processor intent id -> `payment_id`.
    pub const PAYMENTS_BY_INTENT: &str = "payments_by_intent";

    /// Processor webhook events for idempotency, keyed by `event_id`.
    pub const PROCESSOR_EVENTS: &str = "processor_events";

    /// Subscription records, keyed by processor `subscription_id`.
    pub const SUBSCRIPTIONS: &str = "subscriptions";

    /// Index: processor customer id -> owner `UserId`.
    pub const CUSTOMER_LINKS: &str = "customer_links";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::WALLETS,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_WALLET,
        cf::PAYMENTS,
        cf::PAYMENTS_BY_INTENT,
        cf::PROCESSOR_EVENTS,
        cf::SUBSCRIPTIONS,
        cf::CUSTOMER_LINKS,
    ]
}
