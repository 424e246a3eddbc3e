//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use tally_core::{
    PaymentId, PaymentRecord, PaymentStatus, ProcessorEvent, SubscriptionRecord, Transaction,
    TransactionId, UserId, Wallet,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::Store;

/// Number of lock shards. Contention is per-wallet/per-payment, so a modest
/// stripe count keeps unrelated rows independent.
const LOCK_SHARDS: usize = 64;

/// Striped lock table serializing compound read-modify-write sections.
///
/// `RocksDB` write batches are atomic but reads are not part of the batch,
/// so the read-validate-write sequence for a wallet or payment row must be
/// serialized externally. Keys hash to a shard; all compound operations on
/// the same row hash to the same shard and therefore exclude each other.
struct LockTable {
    shards: Vec<Mutex<()>>,
}

impl LockTable {
    fn new() -> Self {
        Self {
            shards: (0..LOCK_SHARDS).map(|_| Mutex::new(())).collect(),
        }
    }

    fn shard_index(key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % LOCK_SHARDS
    }

    fn lock(&self, key: &[u8]) -> MutexGuard<'_, ()> {
        self.shards[Self::shard_index(key)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the shards for two keys in ascending shard order.
    ///
    /// Ascending order prevents lock cycles between concurrent callers; a
    /// single guard is taken when both keys hash to the same shard.
    fn lock_two<'a>(
        &'a self,
        a: &[u8],
        b: &[u8],
    ) -> (MutexGuard<'a, ()>, Option<MutexGuard<'a, ()>>) {
        let (i, j) = (Self::shard_index(a), Self::shard_index(b));
        if i == j {
            return (self.lock_shard(i), None);
        }
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        (self.lock_shard(lo), Some(self.lock_shard(hi)))
    }

    fn lock_shard(&self, index: usize) -> MutexGuard<'_, ()> {
        self.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Lock key for a wallet row (namespaced so it never collides with a
/// payment key hashing).
fn wallet_lock_key(owner: &UserId) -> Vec<u8> {
    let mut key = Vec::with_capacity(17);
    key.push(b'w');
    key.extend_from_slice(owner.as_bytes());
    key
}

/// Lock key for a payment row.
fn payment_lock_key(payment_id: &PaymentId) -> Vec<u8> {
    let mut key = Vec::with_capacity(17);
    key.push(b'p');
    key.extend_from_slice(payment_id.as_bytes());
    key
}

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    locks: LockTable,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::info!("opened RocksDB store");

        Ok(Self {
            db: Arc::new(db),
            locks: LockTable::new(),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Read a single value from a column family.
    fn get_value<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        self.cf(cf_name).and_then(|cf| {
            self.db
                .get_cf(&cf, key)
                .map_err(|e| StoreError::Database(e.to_string()))?
                .map(|data| Self::deserialize(&data))
                .transpose()
        })
    }

    /// Stage a wallet update plus its transaction record into a batch.
    ///
    /// Validates the amount and the balance invariant; the caller must hold
    /// the wallet lock.
    fn stage_transaction(
        &self,
        batch: &mut WriteBatch,
        wallet: &mut Wallet,
        transaction: &Transaction,
    ) -> Result<()> {
        if transaction.amount <= 0 {
            return Err(StoreError::InvalidAmount(transaction.amount));
        }

        let delta = transaction.signed_amount();
        if delta < 0 && wallet.balance < transaction.amount {
            return Err(StoreError::InsufficientBalance {
                balance: wallet.balance,
                required: transaction.amount,
            });
        }

        wallet.balance += delta;
        wallet.updated_at = chrono::Utc::now();

        let cf_wallets = self.cf(cf::WALLETS)?;
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_tx_by_wallet = self.cf(cf::TRANSACTIONS_BY_WALLET)?;

        batch.put_cf(
            &cf_wallets,
            keys::wallet_key(&wallet.owner),
            Self::serialize(wallet)?,
        );
        batch.put_cf(
            &cf_tx,
            keys::transaction_key(&transaction.id),
            Self::serialize(transaction)?,
        );
        batch.put_cf(
            &cf_tx_by_wallet,
            keys::wallet_transaction_key(&wallet.owner, &transaction.id),
            b"", // Index entry (empty value)
        );

        Ok(())
    }

    fn load_wallet_or_new(&self, owner: &UserId) -> Result<Wallet> {
        Ok(self
            .get_value::<Wallet>(cf::WALLETS, &keys::wallet_key(owner))?
            .unwrap_or_else(|| Wallet::new(*owner)))
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Wallet Operations
    // =========================================================================

    fn get_wallet(&self, owner: &UserId) -> Result<Option<Wallet>> {
        self.get_value(cf::WALLETS, &keys::wallet_key(owner))
    }

    fn get_or_create_wallet(&self, owner: &UserId) -> Result<Wallet> {
        let _guard = self.locks.lock(&wallet_lock_key(owner));

        if let Some(wallet) = self.get_wallet(owner)? {
            return Ok(wallet);
        }

        let wallet = Wallet::new(*owner);
        let cf = self.cf(cf::WALLETS)?;
        self.db
            .put_cf(&cf, keys::wallet_key(owner), Self::serialize(&wallet)?)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(wallet)
    }

    fn apply_transaction(&self, transaction: &Transaction) -> Result<i64> {
        let _guard = self.locks.lock(&wallet_lock_key(&transaction.owner));

        let mut wallet = self.load_wallet_or_new(&transaction.owner)?;
        let mut batch = WriteBatch::default();
        self.stage_transaction(&mut batch, &mut wallet, transaction)?;
        self.write_batch(batch)?;

        Ok(wallet.balance)
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>> {
        self.get_value(cf::TRANSACTIONS, &keys::transaction_key(transaction_id))
    }

    fn list_transactions(
        &self,
        owner: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        let cf_by_wallet = self.cf(cf::TRANSACTIONS_BY_WALLET)?;
        let prefix = keys::wallet_transactions_prefix(owner);

        let iter = self.db.iterator_cf(
            &cf_by_wallet,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        // ULIDs are time-ordered, so the index iterates oldest first.
        let mut all_keys: Vec<Vec<u8>> = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            all_keys.push(key.to_vec());
        }

        // Reverse to get newest first.
        all_keys.reverse();

        let mut transactions = Vec::new();
        for key in all_keys.into_iter().skip(offset) {
            if transactions.len() >= limit {
                break;
            }

            let tx_id = keys::extract_transaction_id_from_wallet_key(&key);
            if let Some(tx) = self.get_transaction(&tx_id)? {
                transactions.push(tx);
            }
        }

        Ok(transactions)
    }

    // =========================================================================
    // Payment Operations
    // =========================================================================

    fn put_payment(&self, payment: &PaymentRecord) -> Result<()> {
        let cf_payments = self.cf(cf::PAYMENTS)?;
        let value = Self::serialize(payment)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_payments, keys::payment_key(&payment.id), &value);

        if let Some(intent_id) = &payment.intent_id {
            let cf_by_intent = self.cf(cf::PAYMENTS_BY_INTENT)?;
            batch.put_cf(
                &cf_by_intent,
                keys::intent_key(intent_id),
                payment.id.as_bytes(),
            );
        }

        if let Some(customer_id) = &payment.customer_id {
            let cf_links = self.cf(cf::CUSTOMER_LINKS)?;
            batch.put_cf(
                &cf_links,
                keys::customer_key(customer_id),
                Self::serialize(&payment.owner)?,
            );
        }

        self.write_batch(batch)
    }

    fn get_payment(&self, payment_id: &PaymentId) -> Result<Option<PaymentRecord>> {
        self.get_value(cf::PAYMENTS, &keys::payment_key(payment_id))
    }

    fn get_payment_by_intent(&self, intent_id: &str) -> Result<Option<PaymentRecord>> {
        let cf_by_intent = self.cf(cf::PAYMENTS_BY_INTENT)?;

        let Some(id_bytes) = self
            .db
            .get_cf(&cf_by_intent, keys::intent_key(intent_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let mut bytes = [0u8; 16];
        if id_bytes.len() != 16 {
            return Err(StoreError::Serialization(format!(
                "intent index for {intent_id} has invalid length {}",
                id_bytes.len()
            )));
        }
        bytes.copy_from_slice(&id_bytes);
        let payment_id = PaymentId::from_uuid(uuid::Uuid::from_bytes(bytes));

        self.get_payment(&payment_id)
    }

    fn list_payments(
        &self,
        owner: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PaymentRecord>> {
        let cf_payments = self.cf(cf::PAYMENTS)?;

        // Payment volume per deployment is small; a filtered scan keeps the
        // schema free of another index.
        let mut payments: Vec<PaymentRecord> = Vec::new();
        for item in self.db.iterator_cf(&cf_payments, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let payment: PaymentRecord = Self::deserialize(&value)?;
            if payment.owner == *owner {
                payments.push(payment);
            }
        }

        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(payments.into_iter().skip(offset).take(limit).collect())
    }

    fn settle_payment(
        &self,
        payment_id: &PaymentId,
        credit: Option<&Transaction>,
    ) -> Result<Option<PaymentRecord>> {
        // The owner on a payment record is immutable, so an unlocked read is
        // safe for deriving the wallet lock key.
        let probe = self
            .get_payment(payment_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "payment",
                id: payment_id.to_string(),
            })?;

        let p_key = payment_lock_key(payment_id);
        let w_key = wallet_lock_key(&probe.owner);
        let _guards = match credit {
            Some(_) => {
                let (a, b) = self.locks.lock_two(&p_key, &w_key);
                (a, b)
            }
            None => (self.locks.lock(&p_key), None),
        };

        // Re-read under the lock: another writer may have settled it since
        // the probe.
        let mut payment = self
            .get_payment(payment_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "payment",
                id: payment_id.to_string(),
            })?;

        if payment.status == PaymentStatus::Succeeded {
            return Ok(None);
        }
        if !payment.status.can_transition_to(PaymentStatus::Succeeded) {
            return Err(StoreError::TerminalState {
                payment_id: payment_id.to_string(),
                status: format!("{:?}", payment.status).to_lowercase(),
            });
        }

        let now = chrono::Utc::now();
        payment.status = PaymentStatus::Succeeded;
        payment.updated_at = now;
        if payment.completed_at.is_none() {
            payment.completed_at = Some(now);
        }

        let mut batch = WriteBatch::default();

        if let Some(transaction) = credit {
            let mut wallet = self.load_wallet_or_new(&payment.owner)?;
            self.stage_transaction(&mut batch, &mut wallet, transaction)?;
        }

        let cf_payments = self.cf(cf::PAYMENTS)?;
        batch.put_cf(
            &cf_payments,
            keys::payment_key(payment_id),
            Self::serialize(&payment)?,
        );

        self.write_batch(batch)?;

        Ok(Some(payment))
    }

    fn transition_payment(
        &self,
        payment_id: &PaymentId,
        status: PaymentStatus,
    ) -> Result<PaymentRecord> {
        let _guard = self.locks.lock(&payment_lock_key(payment_id));

        let mut payment = self
            .get_payment(payment_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "payment",
                id: payment_id.to_string(),
            })?;

        if payment.status == status {
            return Ok(payment);
        }
        if !payment.status.can_transition_to(status) {
            return Err(StoreError::TerminalState {
                payment_id: payment_id.to_string(),
                status: format!("{:?}", payment.status).to_lowercase(),
            });
        }

        payment.status = status;
        payment.updated_at = chrono::Utc::now();

        let cf_payments = self.cf(cf::PAYMENTS)?;
        self.db
            .put_cf(
                &cf_payments,
                keys::payment_key(payment_id),
                Self::serialize(&payment)?,
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(payment)
    }

    // =========================================================================
    // Processor Event Operations
    // =========================================================================

    fn get_event(&self, event_id: &str) -> Result<Option<ProcessorEvent>> {
        self.get_value(cf::PROCESSOR_EVENTS, &keys::event_key(event_id))
    }

    fn put_event(&self, event: &ProcessorEvent) -> Result<()> {
        let cf = self.cf(cf::PROCESSOR_EVENTS)?;
        self.db
            .put_cf(
                &cf,
                keys::event_key(&event.event_id),
                Self::serialize(event)?,
            )
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn mark_event_processed(&self, event_id: &str) -> Result<()> {
        let mut event = self.get_event(event_id)?.ok_or_else(|| StoreError::NotFound {
            entity: "processor event",
            id: event_id.to_string(),
        })?;

        event.processed = true;
        event.processed_at = Some(chrono::Utc::now());

        self.put_event(&event)
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    fn put_subscription(&self, subscription: &SubscriptionRecord) -> Result<()> {
        let cf = self.cf(cf::SUBSCRIPTIONS)?;
        self.db
            .put_cf(
                &cf,
                keys::subscription_key(&subscription.subscription_id),
                Self::serialize(subscription)?,
            )
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_subscription(&self, subscription_id: &str) -> Result<Option<SubscriptionRecord>> {
        self.get_value(cf::SUBSCRIPTIONS, &keys::subscription_key(subscription_id))
    }

    // =========================================================================
    // Customer Link Operations
    // =========================================================================

    fn link_customer(&self, customer_id: &str, owner: &UserId) -> Result<()> {
        let cf = self.cf(cf::CUSTOMER_LINKS)?;
        self.db
            .put_cf(
                &cf,
                keys::customer_key(customer_id),
                Self::serialize(owner)?,
            )
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn owner_for_customer(&self, customer_id: &str) -> Result<Option<UserId>> {
        self.get_value(cf::CUSTOMER_LINKS, &keys::customer_key(customer_id))
    }
}
