//! Transaction domain entity.
//! One attempt to collect an invoice through the payment provider, keyed by the
//! provider's checkout session id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Failed => "FAILED",
        }
    }

    /// Only pending transactions move; success and failure are terminal.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Pending, TransactionStatus::Success)
                | (TransactionStatus::Pending, TransactionStatus::Failed)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PENDING" => Ok(TransactionStatus::Pending),
            "SUCCESS" => Ok(TransactionStatus::Success),
            "FAILED" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// Domain entity representing a provider transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    /// Provider session id; unique across all transactions.
    pub transaction_id: String,
    /// Provider name, e.g. `stripe`.
    #[serde(rename = "type")]
    pub kind: String,
    pub status: TransactionStatus,
    pub transaction_date: DateTime<Utc>,
    pub company_id: i64,
    pub invoice_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of asking a transaction to complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Completed,
    AlreadyCompleted,
    Rejected(TransactionStatus),
}

impl Transaction {
    pub fn new(
        transaction_id: String,
        kind: String,
        status: TransactionStatus,
        company_id: i64,
        invoice_id: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            kind,
            status,
            transaction_date: now,
            company_id,
            invoice_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn pending(transaction_id: String, kind: String, company_id: i64, invoice_id: i64) -> Self {
        Self::new(
            transaction_id,
            kind,
            TransactionStatus::Pending,
            company_id,
            invoice_id,
        )
    }

    /// Compare-and-transition to SUCCESS.
    pub fn complete(&mut self) -> Completion {
        match self.status {
            TransactionStatus::Success => Completion::AlreadyCompleted,
            status if status.can_transition_to(TransactionStatus::Success) => {
                self.status = TransactionStatus::Success;
                self.updated_at = Utc::now();
                Completion::Completed
            }
            status => Completion::Rejected(status),
        }
    }
}
