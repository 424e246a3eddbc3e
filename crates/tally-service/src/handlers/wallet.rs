//! Wallet balance and transaction handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use tally_core::Transaction;

use crate::error::ApiError;
use crate::identity::Caller;
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Balance in points.
    pub balance: i64,
}

/// Get the caller's current balance.
///
/// A missing wallet reads as zero; it is not created by this endpoint.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.ledger.balance(&caller.user_id)?;
    Ok(Json(BalanceResponse { balance }))
}

/// Get or create the caller's wallet.
#[derive(Debug, Serialize)]
pub struct WalletResponse {
    /// Wallet owner.
    pub owner: String,
    /// Balance in points.
    pub balance: i64,
    /// When the wallet was created.
    pub created_at: String,
}

/// Ensure the caller's wallet exists and return it.
pub async fn get_or_create_wallet(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<WalletResponse>, ApiError> {
    let wallet = state.ledger.get_or_create_wallet(&caller.user_id)?;
    Ok(Json(WalletResponse {
        owner: wallet.owner.to_string(),
        balance: wallet.balance,
        created_at: wallet.created_at.to_rfc3339(),
    }))
}

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Maximum number of transactions to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Transaction response.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// Kind (deposit, deduct, refund).
    pub kind: String,
    /// Signed amount in points (positive = credit, negative = debit).
    pub amount: i64,
    /// External correlation reference.
    pub reference: String,
    /// Timestamp.
    pub created_at: String,
}

impl From<&Transaction> for TransactionResponse {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id.to_string(),
            kind: format!("{:?}", tx.kind).to_lowercase(),
            amount: tx.signed_amount(),
            reference: tx.reference.clone(),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Whether there are more transactions.
    pub has_more: bool,
}

/// List the caller's transaction history.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    // Fetch one more than requested to determine has_more
    let limit = query.limit.min(100);
    let transactions = state
        .ledger
        .transactions(&caller.user_id, limit + 1, query.offset)?;

    let has_more = transactions.len() > limit;
    let transactions: Vec<_> = transactions
        .iter()
        .take(limit)
        .map(TransactionResponse::from)
        .collect();

    Ok(Json(ListTransactionsResponse {
        transactions,
        has_more,
    }))
}

/// Balance mutation request.
#[derive(Debug, Deserialize)]
pub struct MutateBalanceRequest {
    /// Amount in points, must be positive.
    pub amount: i64,
    /// External correlation reference (e.g. a tool-run id).
    pub reference: String,
}

/// Balance mutation response.
#[derive(Debug, Serialize)]
pub struct MutateBalanceResponse {
    /// New balance in points.
    pub balance: i64,
}

/// Deduct points from the caller's wallet.
pub async fn deduct(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(body): Json<MutateBalanceRequest>,
) -> Result<Json<MutateBalanceResponse>, ApiError> {
    let balance = state
        .ledger
        .deduct(&caller.user_id, body.amount, &body.reference)?;

    tracing::info!(
        user_id = %caller.user_id,
        amount = %body.amount,
        reference = %body.reference,
        new_balance = %balance,
        "Points deducted"
    );

    Ok(Json(MutateBalanceResponse { balance }))
}

/// Refund points to the caller's wallet.
pub async fn refund(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(body): Json<MutateBalanceRequest>,
) -> Result<Json<MutateBalanceResponse>, ApiError> {
    let balance = state
        .ledger
        .refund(&caller.user_id, body.amount, &body.reference)?;

    tracing::info!(
        user_id = %caller.user_id,
        amount = %body.amount,
        reference = %body.reference,
        new_balance = %balance,
        "Points refunded"
    );

    Ok(Json(MutateBalanceResponse { balance }))
}

/// Deposit points into the caller's wallet.
///
/// Intended for platform-internal grants; purchases flow through the
/// payment endpoints instead.
pub async fn deposit(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(body): Json<MutateBalanceRequest>,
) -> Result<Json<MutateBalanceResponse>, ApiError> {
    let balance = state
        .ledger
        .deposit(&caller.user_id, body.amount, &body.reference)?;

    tracing::info!(
        user_id = %caller.user_id,
        amount = %body.amount,
        reference = %body.reference,
        new_balance = %balance,
        "Points deposited"
    );

    Ok(Json(MutateBalanceResponse { balance }))
}
