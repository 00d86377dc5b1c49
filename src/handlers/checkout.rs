use axum::{
    extract::{Path, State},
    http::{header::REFERER, HeaderMap},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::use_cases::create_checkout_session::{
    public_invoice_url, CURRENCY_MISSING, PROVIDER_NOT_CONFIGURED,
};
use crate::use_cases::{CheckoutFlow, InvoiceRef};
use crate::validation::validate_invoice_token;
use crate::AppState;

pub const PAYMENT_ERROR_PARAM: &str = "payment_error";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub url: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/{invoice_id}/stripe/checkout",
    params(("invoice_id" = i64, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutResponse),
        (status = 400, description = "Invoice already paid or not payable"),
        (status = 404, description = "Invoice not found"),
        (status = 500, description = "Payments not configured or provider error"),
        (status = 503, description = "Payment provider unavailable")
    ),
    tag = "Checkout"
)]
pub async fn create_checkout(
    State(state): State<AppState>,
    Path(invoice_id): Path<i64>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let outcome = state
        .checkout
        .execute(InvoiceRef::Id(invoice_id), CheckoutFlow::Authenticated)
        .await?;

    Ok(Json(CheckoutResponse {
        session_id: outcome.session_id,
        url: outcome.url,
    }))
}

#[utoipa::path(
    get,
    path = "/invoices/pay/{token}/stripe",
    params(("token" = String, Path, description = "Invoice unique hash or id")),
    responses(
        (status = 303, description = "Redirect to the hosted checkout page, or back with a payment_error message")
    ),
    tag = "Checkout"
)]
pub async fn public_checkout(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Response {
    let result = match validate_invoice_token(&token) {
        Ok(()) => {
            state
                .checkout
                .execute(InvoiceRef::IdOrHash(token.clone()), CheckoutFlow::Public)
                .await
        }
        Err(e) => Err(AppError::from(e)),
    };

    match result {
        Ok(outcome) => Redirect::to(&outcome.url).into_response(),
        Err(e) => {
            tracing::warn!(token = %token, error = %e, "Public checkout failed");
            let app_url = &state.checkout.settings().app_url;
            match back_url(app_url, &headers, &token, flash_message(&e)) {
                Some(url) => Redirect::to(url.as_str()).into_response(),
                None => e.into_response(),
            }
        }
    }
}

/// Customer-facing text for a failed checkout.
pub fn flash_message(error: &AppError) -> &'static str {
    match error {
        AppError::AlreadyPaid(_) => "This invoice has already been paid.",
        AppError::Configuration(msg) if msg == PROVIDER_NOT_CONFIGURED => {
            "Payment processing is not configured. Please contact support."
        }
        AppError::Configuration(msg) if msg == CURRENCY_MISSING => {
            "Invoice currency information is missing."
        }
        _ => "Unable to process payment. Please try again.",
    }
}

/// Referer when it points into this app, else the public invoice page.
fn back_url(app_url: &Url, headers: &HeaderMap, token: &str, message: &str) -> Option<Url> {
    let referer = headers
        .get(REFERER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Url::parse(v).ok())
        .filter(|url| url.origin() == app_url.origin());

    let mut url = match referer {
        Some(url) => url,
        None => public_invoice_url(app_url, token).ok()?,
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != PAYMENT_ERROR_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.set_query(None);
    {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
        pairs.append_pair(PAYMENT_ERROR_PARAM, message);
    }

    Some(url)
}
