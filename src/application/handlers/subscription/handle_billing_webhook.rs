//! HandleBillingWebhookHandler - Command handler for the billing webhook endpoint.
//!
//! Verification failures are reported to the caller. Once an event is
//! authentic it is always acknowledged: a reconcile failure is logged and
//! parked in the retry outbox instead of asking the provider to redeliver.

use std::sync::Arc;

use crate::domain::subscription::SubscriptionError;
use crate::ports::{BillingGateway, Clock, FailedTransition, ReconcileOutbox, RetryPolicy};

use super::{ReconcileBillingEventHandler, ReconcileOutcome};

/// Command to handle a webhook delivery.
#[derive(Debug, Clone)]
pub struct HandleBillingWebhookCommand {
    /// Raw request body, exactly as received.
    pub payload: Vec<u8>,
    /// `Stripe-Signature` header, if present.
    pub signature: Option<String>,
}

/// Result of webhook processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleBillingWebhookResult {
    /// The event was reconciled.
    Reconciled(ReconcileOutcome),
    /// Reconcile failed; the event waits in the retry outbox.
    Deferred,
}

/// Handler for billing webhooks.
pub struct HandleBillingWebhookHandler {
    gateway: Arc<dyn BillingGateway>,
    reconciler: Arc<ReconcileBillingEventHandler>,
    outbox: Arc<dyn ReconcileOutbox>,
    clock: Arc<dyn Clock>,
    retry_policy: RetryPolicy,
    test_mode: bool,
}

impl HandleBillingWebhookHandler {
    pub fn new(
        gateway: Arc<dyn BillingGateway>,
        reconciler: Arc<ReconcileBillingEventHandler>,
        outbox: Arc<dyn ReconcileOutbox>,
        clock: Arc<dyn Clock>,
        retry_policy: RetryPolicy,
        test_mode: bool,
    ) -> Self {
        Self {
            gateway,
            reconciler,
            outbox,
            clock,
            retry_policy,
            test_mode,
        }
    }

    pub async fn handle(
        &self,
        cmd: HandleBillingWebhookCommand,
    ) -> Result<HandleBillingWebhookResult, SubscriptionError> {
        // 1. Authenticate the delivery
        let event = match cmd.signature.as_deref() {
            Some(signature) => self.gateway.verify_webhook(&cmd.payload, signature).await?,
            None if self.test_mode => {
                tracing::warn!("Test mode: accepting webhook without signature verification");
                self.gateway.parse_unsigned_webhook(&cmd.payload)?
            }
            None => return Err(SubscriptionError::MissingSignature),
        };

        tracing::info!(
            event_id = %event.id,
            event_type = event.event_type.as_str(),
            "Billing webhook received"
        );

        // 2. Reconcile, parking failures in the outbox
        match self.reconciler.handle(&event).await {
            Ok(outcome) => Ok(HandleBillingWebhookResult::Reconciled(outcome)),
            Err(e) => {
                tracing::error!(
                    event_id = %event.id,
                    event_type = event.event_type.as_str(),
                    error = %e,
                    "Failed to reconcile billing event, queueing for retry"
                );

                let entry = FailedTransition::new(
                    event,
                    e.to_string(),
                    self.clock.now(),
                    &self.retry_policy,
                );
                if let Err(enqueue_error) = self.outbox.enqueue(&entry).await {
                    tracing::error!(
                        event_id = %entry.event.id,
                        error = %enqueue_error,
                        "Failed to queue billing event for retry"
                    );
                }

                Ok(HandleBillingWebhookResult::Deferred)
            }
        }
    }
}
