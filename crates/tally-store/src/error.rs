//! Error types for tally storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity name (wallet, payment, transaction, subscription).
        entity: &'static str,
        /// The identifier that was not found.
        id: String,
    },

    /// Non-positive transaction amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    /// Insufficient balance for a deduction.
    #[error("insufficient balance: balance={balance}, required={required}")]
    InsufficientBalance {
        /// Current balance in minor units.
        balance: i64,
        /// Required amount in minor units.
        required: i64,
    },

    /// Attempted transition away from a terminal payment status.
    #[error("payment {payment_id} is in terminal status {status}")]
    TerminalState {
        /// The payment id.
        payment_id: String,
        /// The current terminal status.
        status: String,
    },
}
