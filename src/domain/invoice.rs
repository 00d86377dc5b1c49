//! Invoice aggregate as seen by the reconciliation flow.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaidStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl PaidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaidStatus::Unpaid => "UNPAID",
            PaidStatus::PartiallyPaid => "PARTIALLY_PAID",
            PaidStatus::Paid => "PAID",
        }
    }
}

impl fmt::Display for PaidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaidStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "UNPAID" => Ok(PaidStatus::Unpaid),
            "PARTIALLY_PAID" => Ok(PaidStatus::PartiallyPaid),
            "PAID" => Ok(PaidStatus::Paid),
            other => Err(format!("unknown paid status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Currency {
    pub id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    pub id: i64,
    pub invoice_number: String,
    pub unique_hash: String,
    pub company_id: i64,
    pub customer_id: i64,
    pub currency_id: Option<i64>,
    pub total: BigDecimal,
    pub due_amount: BigDecimal,
    pub exchange_rate: BigDecimal,
    pub paid_status: PaidStatus,
}

/// An invoice loaded together with everything checkout and fulfillment read.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceDetails {
    pub invoice: Invoice,
    pub company: Company,
    pub customer: Customer,
    pub currency: Option<Currency>,
    /// Token of the most recent email sent for this invoice.
    pub email_log_token: Option<String>,
}

impl InvoiceDetails {
    /// Token used in public (unauthenticated) invoice links.
    pub fn public_token(&self) -> &str {
        self.email_log_token
            .as_deref()
            .unwrap_or(&self.invoice.unique_hash)
    }

    pub fn is_paid(&self) -> bool {
        self.invoice.paid_status == PaidStatus::Paid
    }
}

/// How a caller identifies an invoice before it is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceLookup {
    Id(i64),
    /// Public links carry either the unique hash or the numeric id.
    IdOrHash(String),
}

impl fmt::Display for InvoiceLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvoiceLookup::Id(id) => write!(f, "{}", id),
            InvoiceLookup::IdOrHash(token) => f.write_str(token),
        }
    }
}

/// Applies a received payment to a due amount.
///
/// Returns the new due amount (never negative) and the resulting paid status.
pub fn settle(due_amount: &BigDecimal, payment: &BigDecimal) -> (BigDecimal, PaidStatus) {
    let zero = BigDecimal::from(0);
    let remaining = due_amount - payment;
    if remaining <= zero {
        (zero, PaidStatus::Paid)
    } else {
        (remaining, PaidStatus::PartiallyPaid)
    }
}
