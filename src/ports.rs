//! Seams between the reconciliation use cases and the outside world:
//! persistence and the payment provider.

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    FulfillmentDraft, InvoiceDetails, InvoiceLookup, Payment, PaymentMethod, Transaction,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique key already exists. For session ids this means another
    /// request got there first.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(String),
}

const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(err.to_string()),
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                RepositoryError::Conflict(db.message().to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result of recording a fulfilled checkout session.
#[derive(Debug, Clone, PartialEq)]
pub enum FulfillmentRecord {
    /// The transaction reached SUCCESS in this call and a payment was created.
    Fulfilled {
        transaction: Transaction,
        payment: Payment,
        transaction_created: bool,
    },
    /// The transaction was already SUCCESS; nothing was written.
    AlreadyFulfilled {
        transaction: Transaction,
        payment: Option<Payment>,
    },
}

#[async_trait]
pub trait BillingRepository: Send + Sync {
    async fn ping(&self) -> RepositoryResult<()>;

    async fn find_invoice(&self, lookup: &InvoiceLookup) -> RepositoryResult<Option<InvoiceDetails>>;

    async fn find_transaction(&self, session_id: &str) -> RepositoryResult<Option<Transaction>>;

    async fn list_transactions(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Transaction>>;

    /// Inserts a new transaction. Fails with `Conflict` when the session id exists.
    async fn insert_transaction(&self, tx: &Transaction) -> RepositoryResult<Transaction>;

    async fn find_or_create_payment_method(
        &self,
        name: &str,
        company_id: i64,
    ) -> RepositoryResult<PaymentMethod>;

    async fn find_payment_for_transaction(&self, transaction_id: Uuid) -> RepositoryResult<Option<Payment>>;

    /// Atomically moves the session's transaction to SUCCESS (creating it when
    /// absent), inserts the payment and settles the invoice. A transaction that
    /// is already SUCCESS is left untouched.
    async fn record_fulfillment(&self, draft: FulfillmentDraft) -> RepositoryResult<FulfillmentRecord>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Timeouts, connection failures, 429/5xx answers, open circuit. Retryable.
    #[error("payment provider unavailable: {0}")]
    Unavailable(String),

    /// The provider definitively refused the request.
    #[error("payment provider rejected the request: {0}")]
    Rejected(String),

    #[error("invalid response from payment provider: {0}")]
    InvalidResponse(String),
}

/// Provider-agnostic description of a hosted checkout page for one invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub payment_method_types: Vec<String>,
    pub currency: String,
    pub unit_amount: i64,
    pub product_name: String,
    pub product_description: String,
    pub success_url: String,
    pub cancel_url: String,
    pub client_reference_id: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Value stored in `transactions.type`.
    fn name(&self) -> &str;

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError>;

    async fn ping(&self) -> Result<(), ProviderError>;
}
