//! Fulfill payment use case.
//! Turns a provider-confirmed checkout session into a SUCCESS transaction and a
//! payment against the invoice.

use bigdecimal::BigDecimal;
use std::sync::Arc;

use crate::domain::money::from_minor_units;
use crate::domain::{FulfillmentDraft, InvoiceDetails, TransactionStatus};
use crate::error::AppError;
use crate::ports::{BillingRepository, FulfillmentRecord, RepositoryError};
use crate::use_cases::resolve_invoice::{resolve_invoice, InvoiceRef};
use crate::validation::validate_session_id;

pub const STRIPE_PAYMENT_METHOD: &str = "Stripe";
pub const STRIPE_TRANSACTION_TYPE: &str = "stripe";

/// Input for the FulfillPayment use case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentRequest {
    pub session_id: String,
    pub invoice_id: i64,
    /// Charged amount in minor units, as reported by the provider.
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
}

pub struct FulfillPayment {
    repository: Arc<dyn BillingRepository>,
    payment_method_name: String,
    transaction_type: String,
}

impl FulfillPayment {
    pub fn new(repository: Arc<dyn BillingRepository>) -> Self {
        Self {
            repository,
            payment_method_name: STRIPE_PAYMENT_METHOD.to_string(),
            transaction_type: STRIPE_TRANSACTION_TYPE.to_string(),
        }
    }

    #[tracing::instrument(
        skip(self, request),
        fields(session_id = %request.session_id, invoice_id = request.invoice_id)
    )]
    pub async fn execute(&self, request: FulfillmentRequest) -> Result<FulfillmentRecord, AppError> {
        validate_session_id(&request.session_id)?;

        let details =
            resolve_invoice(self.repository.as_ref(), InvoiceRef::Id(request.invoice_id)).await?;

        let method = self
            .repository
            .find_or_create_payment_method(&self.payment_method_name, details.invoice.company_id)
            .await?;

        let amount = payment_amount(&details, request.amount_total, request.currency.as_deref());
        let draft = FulfillmentDraft::for_invoice(
            &details,
            request.session_id.clone(),
            self.transaction_type.clone(),
            &method,
            amount,
        );

        // A conflict means a concurrent delivery touched the same session; the
        // second attempt sees its committed state.
        let record = match self.repository.record_fulfillment(draft.clone()).await {
            Err(RepositoryError::Conflict(first)) => {
                tracing::warn!(error = %first, "Fulfillment conflicted, retrying once");
                match self.repository.record_fulfillment(draft).await {
                    Err(RepositoryError::Conflict(second)) => {
                        self.settle_conflict(&request.session_id, second).await?
                    }
                    other => other?,
                }
            }
            other => other?,
        };

        match &record {
            FulfillmentRecord::Fulfilled {
                payment,
                transaction_created,
                ..
            } => tracing::info!(
                payment_number = %payment.payment_number,
                amount = %payment.amount,
                transaction_created,
                "Payment recorded"
            ),
            FulfillmentRecord::AlreadyFulfilled { .. } => {
                tracing::info!("Session already fulfilled; nothing recorded")
            }
        }

        Ok(record)
    }

    /// Re-runs fulfillment for a recorded session, charging the invoice's due amount.
    pub async fn fulfill_session(&self, session_id: &str) -> Result<FulfillmentRecord, AppError> {
        let transaction = self
            .repository
            .find_transaction(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {}", session_id)))?;

        self.execute(FulfillmentRequest {
            session_id: transaction.transaction_id,
            invoice_id: transaction.invoice_id,
            amount_total: None,
            currency: None,
        })
        .await
    }

    async fn settle_conflict(
        &self,
        session_id: &str,
        message: String,
    ) -> Result<FulfillmentRecord, AppError> {
        let existing = self.repository.find_transaction(session_id).await?;
        match existing {
            Some(transaction) if transaction.status == TransactionStatus::Success => {
                let payment = self
                    .repository
                    .find_payment_for_transaction(transaction.id)
                    .await?;
                Ok(FulfillmentRecord::AlreadyFulfilled {
                    transaction,
                    payment,
                })
            }
            _ => Err(AppError::Conflict(message)),
        }
    }
}

/// The provider's charged amount when it is in the invoice currency, else the
/// invoice's current due amount.
pub fn payment_amount(
    details: &InvoiceDetails,
    amount_total: Option<i64>,
    currency: Option<&str>,
) -> BigDecimal {
    let invoice_currency = details.currency.as_ref().map(|c| c.code.as_str());

    match (amount_total, currency, invoice_currency) {
        (Some(minor), Some(paid), Some(expected)) if paid.eq_ignore_ascii_case(expected) => {
            from_minor_units(minor, expected)
        }
        _ => details.invoice.due_amount.clone(),
    }
}
