use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::domain::{Payment, Transaction};
use crate::error::AppError;
use crate::validation::{validate_pagination, validate_session_id};
use crate::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListParams {
    /// Page size, 1 to 100 (default 20)
    pub limit: Option<i64>,
    /// Rows to skip (default 0)
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentView {
    pub id: Uuid,
    pub payment_number: String,
    pub payment_date: NaiveDate,
    pub amount: String,
    pub exchange_rate: String,
    pub base_amount: String,
    pub currency_id: Option<i64>,
    pub payment_method_id: Uuid,
}

impl From<Payment> for PaymentView {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            payment_number: p.payment_number,
            payment_date: p.payment_date,
            amount: p.amount.to_string(),
            exchange_rate: p.exchange_rate.to_string(),
            base_amount: p.base_amount.to_string(),
            currency_id: p.currency_id,
            payment_method_id: p.payment_method_id,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionView {
    pub id: Uuid,
    pub transaction_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub transaction_date: DateTime<Utc>,
    pub company_id: i64,
    pub invoice_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payment: Option<PaymentView>,
}

impl TransactionView {
    fn new(tx: Transaction, payment: Option<Payment>) -> Self {
        Self {
            id: tx.id,
            transaction_id: tx.transaction_id,
            kind: tx.kind,
            status: tx.status.to_string(),
            transaction_date: tx.transaction_date,
            company_id: tx.company_id,
            invoice_id: tx.invoice_id,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
            payment: payment.map(PaymentView::from),
        }
    }
}

#[utoipa::path(
    get,
    path = "/transactions",
    params(ListParams),
    responses(
        (status = 200, description = "Transactions, newest first", body = [TransactionView]),
        (status = 400, description = "Invalid pagination"),
        (status = 401, description = "Missing or invalid admin API key")
    ),
    security(("admin_api_key" = [])),
    tag = "Transactions"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<TransactionView>>, AppError> {
    let limit = params.limit.unwrap_or(20);
    let offset = params.offset.unwrap_or(0);
    validate_pagination(limit, offset)?;

    let transactions = state.repository.list_transactions(limit, offset).await?;
    let mut views = Vec::with_capacity(transactions.len());
    for tx in transactions {
        let payment = state.repository.find_payment_for_transaction(tx.id).await?;
        views.push(TransactionView::new(tx, payment));
    }

    Ok(Json(views))
}

#[utoipa::path(
    get,
    path = "/transactions/{session_id}",
    params(("session_id" = String, Path, description = "Provider checkout session id")),
    responses(
        (status = 200, description = "Transaction with its payment", body = TransactionView),
        (status = 401, description = "Missing or invalid admin API key"),
        (status = 404, description = "No transaction for this session")
    ),
    security(("admin_api_key" = [])),
    tag = "Transactions"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<TransactionView>, AppError> {
    validate_session_id(&session_id)?;

    let tx = state
        .repository
        .find_transaction(&session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transaction {}", session_id)))?;
    let payment = state.repository.find_payment_for_transaction(tx.id).await?;

    Ok(Json(TransactionView::new(tx, payment)))
}
