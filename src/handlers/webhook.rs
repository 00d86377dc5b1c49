use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::stripe::SIGNATURE_HEADER;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

/// Stripe webhook endpoint. The body is taken raw: the signature covers the
/// exact bytes sent.
#[utoipa::path(
    post,
    path = "/webhooks/stripe",
    request_body(content = String, description = "Raw Stripe event JSON", content_type = "application/json"),
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Invalid signature or payload"),
        (status = 500, description = "Transient failure; the provider will retry")
    ),
    tag = "Webhooks"
)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    let outcome = state.webhooks.execute(&body, signature).await?;
    tracing::debug!(?outcome, "Webhook handled");

    Ok(Json(WebhookAck { received: true }))
}
