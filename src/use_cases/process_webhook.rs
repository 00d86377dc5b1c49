//! Process webhook use case.
//! Verifies a provider delivery and routes completed checkout sessions to
//! fulfillment. Failures that retrying cannot fix are acknowledged so the
//! provider stops redelivering them.

use std::sync::Arc;

use crate::error::AppError;
use crate::ports::FulfillmentRecord;
use crate::stripe::{EventKind, WebhookVerifier};
use crate::use_cases::fulfill_payment::{FulfillPayment, FulfillmentRequest};
use crate::utils::sanitize::sanitize_payload;

/// What happened to an acknowledged delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Fulfilled {
        session_id: String,
        payment_number: String,
    },
    AlreadyFulfilled {
        session_id: String,
    },
    /// Event type without a handler.
    Ignored {
        event_type: String,
    },
    /// Permanent failure, logged and acknowledged.
    Skipped {
        session_id: String,
        reason: String,
    },
}

pub struct ProcessWebhook {
    verifier: WebhookVerifier,
    fulfill: Arc<FulfillPayment>,
}

impl ProcessWebhook {
    pub fn new(verifier: WebhookVerifier, fulfill: Arc<FulfillPayment>) -> Self {
        Self { verifier, fulfill }
    }

    pub fn verifier(&self) -> &WebhookVerifier {
        &self.verifier
    }

    pub async fn execute(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, AppError> {
        let event = self.verifier.verify(payload, signature).map_err(|e| {
            tracing::warn!(error = %e, "Rejected webhook delivery");
            AppError::from(e)
        })?;

        tracing::debug!(
            event_id = event.id.as_deref().unwrap_or("-"),
            payload = %sanitize_payload(payload),
            "Verified webhook event"
        );

        if let EventKind::Other(event_type) = event.kind() {
            tracing::info!(event_type = %event_type, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored { event_type });
        }

        let session = event.checkout_session()?;
        let session_id = session.id.clone();

        let invoice_id = match session.invoice_reference().map(|r| r.trim().parse::<i64>()) {
            Some(Ok(id)) => id,
            Some(Err(_)) | None => {
                let reason = format!(
                    "unusable invoice reference: {:?}",
                    session.invoice_reference()
                );
                tracing::error!(session_id = %session_id, %reason, "Cannot fulfill checkout session");
                return Ok(WebhookOutcome::Skipped { session_id, reason });
            }
        };

        let request = FulfillmentRequest {
            session_id: session_id.clone(),
            invoice_id,
            amount_total: session.amount_total,
            currency: session.currency.clone(),
        };

        match self.fulfill.execute(request).await {
            Ok(FulfillmentRecord::Fulfilled { payment, .. }) => Ok(WebhookOutcome::Fulfilled {
                session_id,
                payment_number: payment.payment_number,
            }),
            Ok(FulfillmentRecord::AlreadyFulfilled { .. }) => {
                Ok(WebhookOutcome::AlreadyFulfilled { session_id })
            }
            Err(e) if !e.is_retryable() => {
                tracing::error!(
                    session_id = %session_id,
                    invoice_id,
                    error = %e,
                    "Checkout session fulfillment failed permanently"
                );
                Ok(WebhookOutcome::Skipped {
                    session_id,
                    reason: e.to_string(),
                })
            }
            Err(e) => {
                tracing::error!(
                    session_id = %session_id,
                    invoice_id,
                    error = %e,
                    "Checkout session fulfillment failed; provider will retry"
                );
                Err(e)
            }
        }
    }
}
