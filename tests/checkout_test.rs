mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use crater_payments::domain::{PaidStatus, TransactionStatus};
use crater_payments::ports::ProviderError;
use tower::ServiceExt;

use common::{body_json, invoice, unpaid, RecordingProvider, TestAppBuilder};

fn checkout_request(invoice_id: i64) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/v1/invoices/{}/stripe/checkout", invoice_id))
        .body(Body::empty())
        .unwrap()
}

fn public_request(token: &str, referer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("GET")
        .uri(format!("/invoices/pay/{}/stripe", token));
    if let Some(referer) = referer {
        builder = builder.header(header::REFERER, referer);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_checkout_creates_session_and_pending_transaction() {
    let app = TestAppBuilder::new().invoice(unpaid(42, "49.99", "USD")).build();

    let response = app.router.clone().oneshot(checkout_request(42)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["sessionId"], "cs_test_1");
    assert_eq!(body["url"], "https://checkout.stripe.com/c/pay/cs_test_1");

    let provider = app.provider.unwrap();
    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.unit_amount, 4999);
    assert_eq!(request.currency, "usd");
    assert_eq!(request.product_name, "Invoice #INV-000042");
    assert_eq!(request.product_description, "Payment for Acme Corp");
    assert_eq!(request.client_reference_id, "42");
    assert_eq!(request.metadata.get("invoice_id").map(String::as_str), Some("42"));
    assert_eq!(request.metadata.get("company_id").map(String::as_str), Some("1"));
    assert_eq!(request.metadata.get("customer_id").map(String::as_str), Some("9"));
    assert_eq!(
        request.payment_method_types,
        vec!["card", "link", "cashapp", "us_bank_account"]
    );
    assert_eq!(
        request.success_url,
        "https://app.crater.test/acme/customer/invoices/42?payment=success"
    );
    assert_eq!(
        request.cancel_url,
        "https://app.crater.test/acme/customer/invoices/42?payment=cancelled"
    );

    let transactions = app.repository.transactions();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].transaction_id, "cs_test_1");
    assert_eq!(transactions[0].status, TransactionStatus::Pending);
    assert_eq!(transactions[0].kind, "stripe");
    assert_eq!(transactions[0].invoice_id, 42);
    assert_eq!(transactions[0].company_id, 1);
}

#[tokio::test]
async fn test_zero_decimal_currency_is_truncated() {
    let app = TestAppBuilder::new().invoice(unpaid(7, "5000.75", "JPY")).build();

    let response = app.router.clone().oneshot(checkout_request(7)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = &app.provider.unwrap().requests()[0];
    assert_eq!(request.unit_amount, 5000);
    assert_eq!(request.currency, "jpy");
}

#[tokio::test]
async fn test_paid_invoice_is_rejected_without_side_effects() {
    let app = TestAppBuilder::new()
        .invoice(invoice(42, "0", Some("USD"), PaidStatus::Paid))
        .build();

    for _ in 0..3 {
        let response = app.router.clone().oneshot(checkout_request(42)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Invoice is already paid");
    }

    assert_eq!(app.provider.unwrap().call_count(), 0);
    assert!(app.repository.transactions().is_empty());
}

#[tokio::test]
async fn test_unknown_invoice_is_not_found() {
    let app = TestAppBuilder::new().build();

    let response = app.router.clone().oneshot(checkout_request(404)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.provider.unwrap().call_count(), 0);
}

#[tokio::test]
async fn test_missing_provider_secret_is_configuration_error() {
    let app = TestAppBuilder::new()
        .provider(None)
        .invoice(unpaid(42, "10", "USD"))
        .build();

    let response = app.router.clone().oneshot(checkout_request(42)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.repository.transactions().is_empty());
}

#[tokio::test]
async fn test_missing_currency_is_configuration_error() {
    let app = TestAppBuilder::new()
        .invoice(invoice(42, "10", None, PaidStatus::Unpaid))
        .build();

    let response = app.router.clone().oneshot(checkout_request(42)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("currency"));
    assert_eq!(app.provider.unwrap().call_count(), 0);
}

#[tokio::test]
async fn test_nothing_due_is_validation_error() {
    let app = TestAppBuilder::new()
        .invoice(invoice(42, "0", Some("USD"), PaidStatus::PartiallyPaid))
        .build();

    let response = app.router.clone().oneshot(checkout_request(42)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.provider.unwrap().call_count(), 0);
}

#[tokio::test]
async fn test_provider_unavailable_is_503_and_records_nothing() {
    let provider = RecordingProvider::failing(ProviderError::Unavailable("timeout".into()));
    let app = TestAppBuilder::new()
        .provider(Some(provider))
        .invoice(unpaid(42, "10", "USD"))
        .build();

    let response = app.router.clone().oneshot(checkout_request(42)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(app.repository.transactions().is_empty());
}

#[tokio::test]
async fn test_provider_rejection_is_500() {
    let provider = RecordingProvider::failing(ProviderError::Rejected("No such currency".into()));
    let app = TestAppBuilder::new()
        .provider(Some(provider))
        .invoice(unpaid(42, "10", "USD"))
        .build();

    let response = app.router.clone().oneshot(checkout_request(42)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_public_checkout_redirects_to_provider() {
    let app = TestAppBuilder::new().invoice(unpaid(42, "49.99", "USD")).build();

    let response = app
        .router
        .clone()
        .oneshot(public_request("hash42", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://checkout.stripe.com/c/pay/cs_test_1"
    );

    let request = &app.provider.unwrap().requests()[0];
    assert_eq!(
        request.success_url,
        "https://app.crater.test/customer/invoices/view/hash42?payment=success"
    );
}

#[tokio::test]
async fn test_public_checkout_uses_email_log_token() {
    let mut details = unpaid(42, "49.99", "USD");
    details.email_log_token = Some("mailtok".to_string());
    let app = TestAppBuilder::new().invoice(details).build();

    let response = app
        .router
        .clone()
        .oneshot(public_request("42", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let request = &app.provider.unwrap().requests()[0];
    assert_eq!(
        request.cancel_url,
        "https://app.crater.test/customer/invoices/view/mailtok?payment=cancelled"
    );
}

#[tokio::test]
async fn test_public_checkout_paid_invoice_redirects_back_with_message() {
    let app = TestAppBuilder::new()
        .invoice(invoice(42, "0", Some("USD"), PaidStatus::Paid))
        .build();

    let response = app
        .router
        .clone()
        .oneshot(public_request(
            "hash42",
            Some("https://app.crater.test/customer/invoices/view/hash42"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://app.crater.test/customer/invoices/view/hash42?payment_error=This+invoice+has+already+been+paid."
    );
    assert_eq!(app.provider.unwrap().call_count(), 0);
}

#[tokio::test]
async fn test_public_checkout_without_provider_redirects_with_support_message() {
    let app = TestAppBuilder::new()
        .provider(None)
        .invoice(unpaid(42, "10", "USD"))
        .build();

    let response = app
        .router
        .clone()
        .oneshot(public_request("hash42", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://app.crater.test/customer/invoices/view/hash42?"));
    assert!(location.contains(
        "payment_error=Payment+processing+is+not+configured.+Please+contact+support."
    ));
}

#[tokio::test]
async fn test_public_checkout_unknown_token_redirects_with_generic_message() {
    let app = TestAppBuilder::new().build();

    let response = app
        .router
        .clone()
        .oneshot(public_request("nope", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://app.crater.test/customer/invoices/view/nope?payment_error=Unable+to+process+payment.+Please+try+again."
    );
}
