use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::ports::{CheckoutSession, CheckoutSessionRequest, PaymentProvider, ProviderError};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";
pub const PROVIDER_NAME: &str = "stripe";

#[derive(Error, Debug)]
pub enum StripeError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Stripe API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response from Stripe: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

impl StripeError {
    /// Failures worth retrying later; these also count against the circuit.
    pub fn is_transient(&self) -> bool {
        match self {
            StripeError::RequestError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            StripeError::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            StripeError::InvalidResponse(_) => false,
            StripeError::CircuitBreakerOpen(_) => true,
        }
    }
}

impl From<StripeError> for ProviderError {
    fn from(err: StripeError) -> Self {
        if err.is_transient() {
            return ProviderError::Unavailable(err.to_string());
        }
        match err {
            StripeError::InvalidResponse(msg) => ProviderError::InvalidResponse(msg),
            other => ProviderError::Rejected(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// HTTP client for the Stripe REST API
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    base_url: String,
    secret_key: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl StripeClient {
    /// Creates a client with a 30 second timeout and the default circuit breaker
    pub fn new(base_url: String, secret_key: String) -> Self {
        Self::with_options(base_url, secret_key, Duration::from_secs(30), 3, 60)
    }

    pub fn with_options(
        base_url: String,
        secret_key: String,
        timeout: Duration,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        StripeClient {
            client,
            base_url,
            secret_key,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Creates a hosted Checkout Session (`POST /v1/checkout/sessions`)
    pub async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, StripeError> {
        let url = self.endpoint("v1/checkout/sessions");
        let params = form_params(request);
        let client = self.client.clone();
        let secret = self.secret_key.clone();

        let call = async move {
            let response = client
                .post(&url)
                .basic_auth(secret, Option::<&str>::None)
                .form(&params)
                .send()
                .await?;

            let response = error_for_status(response).await?;
            let session = response
                .json::<SessionResponse>()
                .await
                .map_err(|e| StripeError::InvalidResponse(e.to_string()))?;

            let url = session.url.ok_or_else(|| {
                StripeError::InvalidResponse(format!("session {} has no url", session.id))
            })?;
            Ok(CheckoutSession {
                id: session.id,
                url,
            })
        };

        self.guarded(call).await
    }

    /// Authenticated read used as a reachability probe (`GET /v1/balance`)
    pub async fn check_connectivity(&self) -> Result<(), StripeError> {
        let url = self.endpoint("v1/balance");
        let client = self.client.clone();
        let secret = self.secret_key.clone();

        let call = async move {
            let response = client
                .get(&url)
                .basic_auth(secret, Option::<&str>::None)
                .send()
                .await?;
            error_for_status(response).await?;
            Ok(())
        };

        self.guarded(call).await
    }

    async fn guarded<T, F>(&self, call: F) -> Result<T, StripeError>
    where
        F: std::future::Future<Output = Result<T, StripeError>>,
    {
        // Only transient failures trip the breaker; a 4xx says nothing about availability.
        let result = self
            .circuit_breaker
            .call_with(|e: &StripeError| e.is_transient(), call)
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(StripeError::CircuitBreakerOpen(
                "Stripe API circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, StripeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .unwrap_or(body);

    Err(StripeError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Flattens a checkout request into Stripe's bracketed form encoding.
pub fn form_params(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = request
        .payment_method_types
        .iter()
        .enumerate()
        .map(|(i, kind)| (format!("payment_method_types[{}]", i), kind.clone()))
        .collect();

    let item = "line_items[0]";
    params.extend([
        (format!("{}[price_data][currency]", item), request.currency.clone()),
        (
            format!("{}[price_data][product_data][name]", item),
            request.product_name.clone(),
        ),
        (
            format!("{}[price_data][product_data][description]", item),
            request.product_description.clone(),
        ),
        (
            format!("{}[price_data][unit_amount]", item),
            request.unit_amount.to_string(),
        ),
        (format!("{}[quantity]", item), "1".to_string()),
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        (
            "client_reference_id".to_string(),
            request.client_reference_id.clone(),
        ),
    ]);

    params.extend(
        request
            .metadata
            .iter()
            .map(|(key, value)| (format!("metadata[{}]", key), value.clone())),
    );

    params
}

#[async_trait]
impl PaymentProvider for StripeClient {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        self.create_session(request).await.map_err(ProviderError::from)
    }

    async fn ping(&self) -> Result<(), ProviderError> {
        self.check_connectivity().await.map_err(ProviderError::from)
    }
}
