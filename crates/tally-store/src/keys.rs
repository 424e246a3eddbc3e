//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions for encoding and decoding keys used in
//! column families.

use tally_core::{PaymentId, TransactionId, UserId};

/// Create a wallet key from an owner ID.
#[must_use]
pub fn wallet_key(owner: &UserId) -> Vec<u8> {
    owner.as_bytes().to_vec()
}

/// Create a transaction key from a transaction ID.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create a wallet-transaction index key.
///
/// Format: `owner (16 bytes) || transaction_id (16 bytes)`
///
/// Since ULIDs are time-ordered, transactions for a wallet will be sorted
/// by creation time.
#[must_use]
pub fn wallet_transaction_key(owner: &UserId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(owner.as_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Create a prefix for iterating all transactions for a wallet.
#[must_use]
pub fn wallet_transactions_prefix(owner: &UserId) -> Vec<u8> {
    owner.as_bytes().to_vec()
}

/// Extract the transaction ID from a wallet-transaction index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_transaction_id_from_wallet_key(key: &[u8]) -> TransactionId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    TransactionId::from_bytes(bytes)
}

/// Create a payment key from a payment ID.
#[must_use]
pub fn payment_key(payment_id: &PaymentId) -> Vec<u8> {
    payment_id.as_bytes().to_vec()
}

/// Create an intent index key from a processor intent id.
#[must_use]
pub fn intent_key(intent_id: &str) -> Vec<u8> {
    intent_id.as_bytes().to_vec()
}

/// Create a processor event key from an event id.
#[must_use]
pub fn event_key(event_id: &str) -> Vec<u8> {
    event_id.as_bytes().to_vec()
}

/// Create a subscription key from a processor subscription id.
#[must_use]
pub fn subscription_key(subscription_id: &str) -> Vec<u8> {
    subscription_id.as_bytes().to_vec()
}

/// Create a customer link key from a processor customer id.
#[must_use]
pub fn customer_key(customer_id: &str) -> Vec<u8> {
    customer_id.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_key_length() {
        let owner = UserId::generate();
        let key = wallet_key(&owner);
        assert_eq!(key.len(), 16);
    }

    #[test]
    fn wallet_transaction_key_format() {
        let owner = UserId::generate();
        let tx_id = TransactionId::generate();
        let key = wallet_transaction_key(&owner, &tx_id);

        assert_eq!(key.len(), 32);
        assert_eq!(&key[..16], owner.as_bytes());
        assert_eq!(&key[16..], tx_id.to_bytes());
    }

    #[test]
    fn extract_transaction_id_roundtrip() {
        let owner = UserId::generate();
        let tx_id = TransactionId::generate();
        let key = wallet_transaction_key(&owner, &tx_id);

        let extracted = extract_transaction_id_from_wallet_key(&key);
        assert_eq!(extracted, tx_id);
    }

    #[test]
    fn payment_key_length() {
        let id = PaymentId::generate();
        assert_eq!(payment_key(&id).len(), 16);
    }
}
