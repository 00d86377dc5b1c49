pub mod checkout;
pub mod transactions;
pub mod webhook;

use crate::health::{DependencyStatus, HealthResponse};
use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy or degraded", body = HealthResponse),
        (status = 503, description = "A critical dependency is down", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let health_response = state.health.check_health().await;

    let status_code = if health_response.is_serving() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_response))
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "admin_api_key",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Crater Payments",
        description = "Stripe checkout and webhook reconciliation for invoices"
    ),
    paths(
        health,
        checkout::create_checkout,
        checkout::public_checkout,
        webhook::stripe_webhook,
        transactions::list_transactions,
        transactions::get_transaction,
    ),
    components(schemas(
        HealthResponse,
        DependencyStatus,
        checkout::CheckoutResponse,
        webhook::WebhookAck,
        transactions::TransactionView,
        transactions::PaymentView,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Dependency health"),
        (name = "Checkout", description = "Hosted checkout sessions for invoices"),
        (name = "Webhooks", description = "Provider callbacks"),
        (name = "Transactions", description = "Operator views of reconciled transactions")
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
