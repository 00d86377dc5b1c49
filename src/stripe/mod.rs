pub mod client;
pub mod webhook;

pub use client::{StripeClient, StripeError};
pub use webhook::{
    CheckoutSessionObject, EventKind, StripeEvent, WebhookError, WebhookVerifier,
    CHECKOUT_SESSION_COMPLETED, SIGNATURE_HEADER,
};
