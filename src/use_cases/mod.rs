//! Application use cases. Each one depends only on the ports.

pub mod create_checkout_session;
pub mod fulfill_payment;
pub mod process_webhook;
pub mod resolve_invoice;

pub use create_checkout_session::{CheckoutFlow, CheckoutOutcome, CheckoutSettings, CreateCheckoutSession};
pub use fulfill_payment::{FulfillPayment, FulfillmentRequest};
pub use process_webhook::{ProcessWebhook, WebhookOutcome};
pub use resolve_invoice::{resolve_invoice, InvoiceRef};
