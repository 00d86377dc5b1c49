pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod ports;
pub mod secrets;
pub mod startup;
pub mod stripe;
pub mod use_cases;
pub mod utils;
pub mod validation;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::{AllowedOrigins, Config};
use crate::health::{DatabaseChecker, HealthMonitor, PaymentProviderChecker};
use crate::ports::{BillingRepository, PaymentProvider};
use crate::stripe::WebhookVerifier;
use crate::use_cases::{CheckoutSettings, CreateCheckoutSession, FulfillPayment, ProcessWebhook};

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn BillingRepository>,
    pub checkout: Arc<CreateCheckoutSession>,
    pub fulfill: Arc<FulfillPayment>,
    pub webhooks: Arc<ProcessWebhook>,
    pub health: Arc<HealthMonitor>,
    pub admin_api_key: Option<String>,
}

impl AppState {
    /// Wires the use cases around one repository and an optional provider
    /// (absent when no provider secret key is configured).
    pub fn new(
        repository: Arc<dyn BillingRepository>,
        provider: Option<Arc<dyn PaymentProvider>>,
        checkout_settings: CheckoutSettings,
        verifier: WebhookVerifier,
        admin_api_key: Option<String>,
    ) -> Self {
        let mut health = HealthMonitor::new().register(
            "database",
            true,
            Arc::new(DatabaseChecker::new(repository.clone())),
        );
        if let Some(provider) = &provider {
            health = health.register(
                provider.name().to_string(),
                false,
                Arc::new(PaymentProviderChecker::new(provider.clone())),
            );
        }

        let fulfill = Arc::new(FulfillPayment::new(repository.clone()));
        let checkout = Arc::new(CreateCheckoutSession::new(
            repository.clone(),
            provider,
            checkout_settings,
        ));
        let webhooks = Arc::new(ProcessWebhook::new(verifier, fulfill.clone()));

        Self {
            repository,
            checkout,
            fulfill,
            webhooks,
            health: Arc::new(health),
            admin_api_key,
        }
    }

    pub fn from_config(
        config: &Config,
        repository: Arc<dyn BillingRepository>,
        provider: Option<Arc<dyn PaymentProvider>>,
    ) -> Self {
        Self::new(
            repository,
            provider,
            CheckoutSettings {
                app_url: config.app_url.clone(),
                payment_method_types: config.stripe.payment_method_types.clone(),
            },
            WebhookVerifier::new(
                config.stripe.webhook_secret.clone(),
                config.stripe.webhook_tolerance,
            ),
            config.admin_api_key.clone(),
        )
    }
}

pub fn create_app(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/transactions", get(handlers::transactions::list_transactions))
        .route(
            "/transactions/:session_id",
            get(handlers::transactions::get_transaction),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::admin_auth,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/v1/invoices/:invoice_id/stripe/checkout",
            post(handlers::checkout::create_checkout),
        )
        .route(
            "/invoices/pay/:token/stripe",
            get(handlers::checkout::public_checkout),
        )
        .route("/webhooks/stripe", post(handlers::webhook::stripe_webhook))
        .merge(admin_routes)
        .merge(handlers::swagger_ui())
        .layer(axum_middleware::from_fn(
            middleware::request_logger::request_logger_middleware,
        ))
        .with_state(state)
}

pub fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    let allow_origin = match origins {
        AllowedOrigins::Any => AllowOrigin::any(),
        AllowedOrigins::List(list) => AllowOrigin::list(
            list.iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        ),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
