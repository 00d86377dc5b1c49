//! Turns any invoice reference into a loaded invoice.

use crate::domain::{InvoiceDetails, InvoiceLookup};
use crate::error::AppError;
use crate::ports::BillingRepository;

/// An invoice as callers hold it before checkout or fulfillment.
#[derive(Debug, Clone, PartialEq)]
pub enum InvoiceRef {
    Id(i64),
    IdOrHash(String),
    Resolved(Box<InvoiceDetails>),
}

impl From<InvoiceDetails> for InvoiceRef {
    fn from(details: InvoiceDetails) -> Self {
        InvoiceRef::Resolved(Box::new(details))
    }
}

pub async fn resolve_invoice(
    repository: &dyn BillingRepository,
    reference: InvoiceRef,
) -> Result<InvoiceDetails, AppError> {
    let lookup = match reference {
        InvoiceRef::Resolved(details) => return Ok(*details),
        InvoiceRef::Id(id) => InvoiceLookup::Id(id),
        InvoiceRef::IdOrHash(token) => InvoiceLookup::IdOrHash(token),
    };

    repository
        .find_invoice(&lookup)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Invoice {}", lookup)))
}
