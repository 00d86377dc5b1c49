//! Ledger entries produced by fulfillment.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::invoice::InvoiceDetails;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentMethod {
    pub id: Uuid,
    pub name: String,
    pub company_id: i64,
}

impl PaymentMethod {
    pub fn new(name: String, company_id: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            company_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub payment_number: String,
    pub sequence_number: i64,
    pub payment_date: NaiveDate,
    pub amount: BigDecimal,
    pub exchange_rate: BigDecimal,
    pub base_amount: BigDecimal,
    pub invoice_id: i64,
    pub customer_id: i64,
    pub company_id: i64,
    pub currency_id: Option<i64>,
    pub payment_method_id: Uuid,
    pub transaction_id: Uuid,
    pub created_at: DateTime<Utc>,
}

pub fn format_payment_number(sequence_number: i64) -> String {
    format!("PAY-{:06}", sequence_number)
}

/// Everything needed to record one fulfilled checkout session.
#[derive(Debug, Clone, PartialEq)]
pub struct FulfillmentDraft {
    pub session_id: String,
    pub provider: String,
    pub company_id: i64,
    pub invoice_id: i64,
    pub customer_id: i64,
    pub currency_id: Option<i64>,
    pub payment_method_id: Uuid,
    pub amount: BigDecimal,
    pub exchange_rate: BigDecimal,
    pub payment_date: NaiveDate,
}

impl FulfillmentDraft {
    pub fn for_invoice(
        details: &InvoiceDetails,
        session_id: String,
        provider: String,
        payment_method: &PaymentMethod,
        amount: BigDecimal,
    ) -> Self {
        Self {
            session_id,
            provider,
            company_id: details.invoice.company_id,
            invoice_id: details.invoice.id,
            customer_id: details.invoice.customer_id,
            currency_id: details.invoice.currency_id,
            payment_method_id: payment_method.id,
            amount,
            exchange_rate: details.invoice.exchange_rate.clone(),
            payment_date: Utc::now().date_naive(),
        }
    }

    pub fn base_amount(&self) -> BigDecimal {
        &self.amount * &self.exchange_rate
    }

    /// Builds the payment row for a transaction that has just reached SUCCESS.
    pub fn into_payment(self, transaction_id: Uuid, sequence_number: i64) -> Payment {
        let base_amount = self.base_amount();
        Payment {
            id: Uuid::new_v4(),
            payment_number: format_payment_number(sequence_number),
            sequence_number,
            payment_date: self.payment_date,
            amount: self.amount,
            exchange_rate: self.exchange_rate,
            base_amount,
            invoice_id: self.invoice_id,
            customer_id: self.customer_id,
            company_id: self.company_id,
            currency_id: self.currency_id,
            payment_method_id: self.payment_method_id,
            transaction_id,
            created_at: Utc::now(),
        }
    }
}
