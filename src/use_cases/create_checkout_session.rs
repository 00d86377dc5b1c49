//! Create checkout session use case.
//! Validates that an invoice can be paid, asks the payment provider for a hosted
//! checkout page and records the PENDING transaction for the returned session.

use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

use crate::domain::money::to_minor_units;
use crate::domain::{InvoiceDetails, Transaction};
use crate::error::AppError;
use crate::ports::{BillingRepository, CheckoutSessionRequest, PaymentProvider, RepositoryError};
use crate::use_cases::resolve_invoice::{resolve_invoice, InvoiceRef};
use crate::validation::{validate_currency_code, validate_positive_amount};

pub const ALREADY_PAID: &str = "Invoice is already paid";
pub const PROVIDER_NOT_CONFIGURED: &str = "Stripe secret key is not configured";
pub const CURRENCY_MISSING: &str = "Invoice currency is missing";

/// Who started the checkout; decides where the provider sends the customer back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutFlow {
    Authenticated,
    Public,
}

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub app_url: Url,
    pub payment_method_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutOutcome {
    pub session_id: String,
    pub url: String,
    pub transaction: Transaction,
}

pub struct CreateCheckoutSession {
    repository: Arc<dyn BillingRepository>,
    provider: Option<Arc<dyn PaymentProvider>>,
    settings: CheckoutSettings,
}

impl CreateCheckoutSession {
    /// `provider` is `None` when no provider secret key is configured.
    pub fn new(
        repository: Arc<dyn BillingRepository>,
        provider: Option<Arc<dyn PaymentProvider>>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            repository,
            provider,
            settings,
        }
    }

    pub fn settings(&self) -> &CheckoutSettings {
        &self.settings
    }

    #[tracing::instrument(
        skip(self, reference),
        fields(invoice_id = tracing::field::Empty, session_id = tracing::field::Empty)
    )]
    pub async fn execute(
        &self,
        reference: InvoiceRef,
        flow: CheckoutFlow,
    ) -> Result<CheckoutOutcome, AppError> {
        let details = resolve_invoice(self.repository.as_ref(), reference).await?;
        tracing::Span::current().record("invoice_id", details.invoice.id);

        if details.is_paid() {
            return Err(AppError::AlreadyPaid(ALREADY_PAID.to_string()));
        }

        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| AppError::Configuration(PROVIDER_NOT_CONFIGURED.to_string()))?;

        let currency = details
            .currency
            .as_ref()
            .map(|c| c.code.trim().to_lowercase())
            .filter(|code| validate_currency_code(code).is_ok())
            .ok_or_else(|| AppError::Configuration(CURRENCY_MISSING.to_string()))?;

        validate_positive_amount("due_amount", &details.invoice.due_amount)?;
        let unit_amount = to_minor_units(&details.invoice.due_amount, &currency)
            .filter(|amount| *amount > 0)
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "due_amount: {} {} cannot be charged",
                    details.invoice.due_amount, currency
                ))
            })?;

        let request = self.build_request(&details, flow, currency, unit_amount)?;
        let session = provider.create_checkout_session(&request).await?;
        tracing::Span::current().record("session_id", session.id.as_str());

        let pending = Transaction::pending(
            session.id.clone(),
            provider.name().to_string(),
            details.invoice.company_id,
            details.invoice.id,
        );
        let transaction = self.record_pending(pending).await?;

        tracing::info!(
            invoice_id = details.invoice.id,
            session_id = %session.id,
            unit_amount,
            "Checkout session created"
        );

        Ok(CheckoutOutcome {
            session_id: session.id,
            url: session.url,
            transaction,
        })
    }

    fn build_request(
        &self,
        details: &InvoiceDetails,
        flow: CheckoutFlow,
        currency: String,
        unit_amount: i64,
    ) -> Result<CheckoutSessionRequest, AppError> {
        let invoice = &details.invoice;
        let page = invoice_page_url(&self.settings.app_url, details, flow)?;

        let mut metadata = BTreeMap::new();
        metadata.insert("invoice_id".to_string(), invoice.id.to_string());
        metadata.insert("company_id".to_string(), invoice.company_id.to_string());
        metadata.insert("customer_id".to_string(), invoice.customer_id.to_string());

        Ok(CheckoutSessionRequest {
            payment_method_types: self.settings.payment_method_types.clone(),
            currency,
            unit_amount,
            product_name: format!("Invoice #{}", invoice.invoice_number),
            product_description: format!("Payment for {}", details.company.name),
            success_url: with_payment_state(&page, "success"),
            cancel_url: with_payment_state(&page, "cancelled"),
            client_reference_id: invoice.id.to_string(),
            metadata,
        })
    }

    /// The completion webhook may already have created the row; keep it as is.
    async fn record_pending(&self, pending: Transaction) -> Result<Transaction, AppError> {
        match self.repository.insert_transaction(&pending).await {
            Ok(tx) => Ok(tx),
            Err(RepositoryError::Conflict(_)) => {
                let existing = self
                    .repository
                    .find_transaction(&pending.transaction_id)
                    .await?;
                existing.ok_or_else(|| {
                    AppError::Persistence(format!(
                        "transaction {} conflicted but could not be read back",
                        pending.transaction_id
                    ))
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Page the customer sees for this invoice.
///
/// Authenticated: `<app>/<company slug>/customer/invoices/<id>`.
/// Public: `<app>/customer/invoices/view/<email token or unique hash>`.
pub fn invoice_page_url(
    app_url: &Url,
    details: &InvoiceDetails,
    flow: CheckoutFlow,
) -> Result<Url, AppError> {
    match flow {
        CheckoutFlow::Authenticated => {
            let id = details.invoice.id.to_string();
            app_path(
                app_url,
                &[details.company.slug.as_str(), "customer", "invoices", id.as_str()],
            )
        }
        CheckoutFlow::Public => public_invoice_url(app_url, details.public_token()),
    }
}

pub fn public_invoice_url(app_url: &Url, token: &str) -> Result<Url, AppError> {
    app_path(app_url, &["customer", "invoices", "view", token])
}

fn app_path(app_url: &Url, segments: &[&str]) -> Result<Url, AppError> {
    let mut url = app_url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| AppError::Configuration(format!("APP_URL cannot be a base: {}", app_url)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn with_payment_state(page: &Url, state: &str) -> String {
    let mut url = page.clone();
    url.query_pairs_mut().append_pair("payment", state);
    url.into()
}
