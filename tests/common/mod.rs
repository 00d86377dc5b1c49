#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use bigdecimal::BigDecimal;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use crater_payments::adapters::InMemoryBillingRepository;
use crater_payments::domain::{Company, Currency, Customer, Invoice, InvoiceDetails, PaidStatus};
use crater_payments::ports::{
    BillingRepository, CheckoutSession, CheckoutSessionRequest, PaymentProvider, ProviderError,
};
use crater_payments::stripe::webhook::signature_header;
use crater_payments::stripe::WebhookVerifier;
use crater_payments::use_cases::CheckoutSettings;
use crater_payments::{create_app, AppState};

pub const APP_URL: &str = "https://app.crater.test";
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const ADMIN_KEY: &str = "admin-test-key";

pub fn invoice(id: i64, due: &str, currency: Option<&str>, status: PaidStatus) -> InvoiceDetails {
    InvoiceDetails {
        invoice: Invoice {
            id,
            invoice_number: format!("INV-{:06}", id),
            unique_hash: format!("hash{}", id),
            company_id: 1,
            customer_id: 9,
            currency_id: currency.map(|_| 3),
            total: due.parse().unwrap(),
            due_amount: due.parse().unwrap(),
            exchange_rate: BigDecimal::from(1),
            paid_status: status,
        },
        company: Company {
            id: 1,
            name: "Acme Corp".to_string(),
            slug: "acme".to_string(),
        },
        customer: Customer {
            id: 9,
            name: "Jane Doe".to_string(),
            email: Some("jane@example.com".to_string()),
        },
        currency: currency.map(|code| Currency {
            id: 3,
            code: code.to_string(),
            name: code.to_string(),
        }),
        email_log_token: None,
    }
}

pub fn unpaid(id: i64, due: &str, currency: &str) -> InvoiceDetails {
    invoice(id, due, Some(currency), PaidStatus::Unpaid)
}

/// Payment provider double that records every request it receives.
pub struct RecordingProvider {
    requests: Mutex<Vec<CheckoutSessionRequest>>,
    failure: Option<ProviderError>,
}

impl RecordingProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            failure: None,
        })
    }

    pub fn failing(error: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            failure: Some(error),
        })
    }

    pub fn requests(&self) -> Vec<CheckoutSessionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentProvider for RecordingProvider {
    fn name(&self) -> &str {
        "stripe"
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        let count = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let id = format!("cs_test_{}", count);
        Ok(CheckoutSession {
            url: format!("https://checkout.stripe.com/c/pay/{}", id),
            id,
        })
    }

    async fn ping(&self) -> Result<(), ProviderError> {
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub repository: Arc<InMemoryBillingRepository>,
    pub provider: Option<Arc<RecordingProvider>>,
}

pub struct TestAppBuilder {
    provider: Option<Arc<RecordingProvider>>,
    webhook_secret: Option<String>,
    admin_key: Option<String>,
    invoices: Vec<InvoiceDetails>,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        Self {
            provider: Some(RecordingProvider::new()),
            webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            admin_key: Some(ADMIN_KEY.to_string()),
            invoices: Vec::new(),
        }
    }

    pub fn provider(mut self, provider: Option<Arc<RecordingProvider>>) -> Self {
        self.provider = provider;
        self
    }

    pub fn webhook_secret(mut self, secret: Option<&str>) -> Self {
        self.webhook_secret = secret.map(str::to_string);
        self
    }

    pub fn admin_key(mut self, key: Option<&str>) -> Self {
        self.admin_key = key.map(str::to_string);
        self
    }

    pub fn invoice(mut self, details: InvoiceDetails) -> Self {
        self.invoices.push(details);
        self
    }

    pub fn build(self) -> TestApp {
        let repository = Arc::new(InMemoryBillingRepository::new());
        for details in self.invoices {
            repository.put_invoice(details);
        }

        let provider = self
            .provider
            .clone()
            .map(|p| p as Arc<dyn PaymentProvider>);
        let state = AppState::new(
            repository.clone() as Arc<dyn BillingRepository>,
            provider,
            CheckoutSettings {
                app_url: Url::parse(APP_URL).unwrap(),
                payment_method_types: vec![
                    "card".to_string(),
                    "link".to_string(),
                    "cashapp".to_string(),
                    "us_bank_account".to_string(),
                ],
            },
            WebhookVerifier::new(self.webhook_secret, Duration::from_secs(300)),
            self.admin_key,
        );

        TestApp {
            router: create_app(state),
            repository,
            provider: self.provider,
        }
    }
}

pub fn checkout_completed_event(session_id: &str, invoice_id: Option<&str>, amount_total: i64) -> String {
    let metadata = match invoice_id {
        Some(id) => serde_json::json!({"invoice_id": id, "company_id": "1", "customer_id": "9"}),
        None => serde_json::json!({}),
    };
    serde_json::json!({
        "id": format!("evt_{}", session_id),
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "object": "checkout.session",
                "metadata": metadata,
                "client_reference_id": null,
                "amount_total": amount_total,
                "currency": "usd",
                "payment_status": "paid",
                "customer_details": {"email": "jane@example.com"}
            }
        }
    })
    .to_string()
}

pub fn webhook_request(body: &str, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("Stripe-Signature", signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn signed_webhook_request(body: &str) -> Request<Body> {
    let signature =
        signature_header(WEBHOOK_SECRET, chrono::Utc::now().timestamp(), body.as_bytes()).unwrap();
    webhook_request(body, Some(signature))
}

pub async fn body_json(response: Response<axum::body::BoxBody>) -> serde_json::Value {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
