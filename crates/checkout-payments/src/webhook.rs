//! Webhook Reconciliation Engine
//!
//! Receives asynchronous, at-least-once, possibly out-of-order deliveries
//! from the processor, verifies their authenticity against the raw body,
//! and reconciles them into the transaction store. Notifications fire
//! exactly once per detected transition into a notified status; everything
//! past the authenticity check is acknowledged so the processor does not
//! redeliver events we have already absorbed.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{PaymentError, Result};
use crate::event::{EventKind, WebhookEvent};
use crate::money::format_brl;
use crate::signature::SignatureVerifier;
use crate::transaction::{TransactionRecord, TransactionStatus, TransactionStore, UpsertOutcome};

/// Side-effect channel for settled payment outcomes
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn payment_succeeded(&self, record: &TransactionRecord) -> anyhow::Result<()>;

    async fn payment_failed(&self, record: &TransactionRecord) -> anyhow::Result<()>;
}

/// Notifier that writes structured log lines. A real delivery channel
/// (email, SMS) would implement [`Notifier`] and replace this.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn payment_succeeded(&self, record: &TransactionRecord) -> anyhow::Result<()> {
        tracing::info!(
            transaction_id = %record.id,
            amount = %format_brl(record.amount),
            "Payment confirmation sent"
        );
        Ok(())
    }

    async fn payment_failed(&self, record: &TransactionRecord) -> anyhow::Result<()> {
        tracing::warn!(
            transaction_id = %record.id,
            amount = %format_brl(record.amount),
            reason = record.failure_reason.as_deref().unwrap_or("unknown"),
            "Payment failure notice sent"
        );
        Ok(())
    }
}

/// What the engine did with a delivery. The caller acknowledges every
/// variant with success; they exist for logging and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Store updated and a notification dispatched
    RecordedAndNotified,
    /// Store updated; no notification due for this status
    Recorded,
    /// Redelivery of an already-applied transition; nothing changed
    Duplicate,
    /// Stale regression kept out of the store
    StaleIgnored,
    /// Dispute or unrecognized event, logged only
    Logged,
    /// Payload shape missing required fields; logged and acknowledged
    Malformed,
}

/// The reconciliation core
pub struct WebhookEngine {
    verifier: SignatureVerifier,
    store: Arc<dyn TransactionStore>,
    notifier: Arc<dyn Notifier>,
}

impl WebhookEngine {
    pub fn new(
        verifier: SignatureVerifier,
        store: Arc<dyn TransactionStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            verifier,
            store,
            notifier,
        }
    }

    /// Process one inbound delivery.
    ///
    /// Signature and payload errors are the only failure paths the caller
    /// should surface; the processor redelivers on non-2xx, and redelivering
    /// an unauthenticated or unparseable body can never help.
    pub async fn process(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<Disposition> {
        let header = signature_header
            .filter(|header| !header.is_empty())
            .ok_or(PaymentError::MissingSignature)?;

        self.verifier.verify(raw_body, header)?;
        let event = WebhookEvent::from_bytes(raw_body)?;

        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Webhook received"
        );

        match event.kind() {
            EventKind::PaymentSucceeded => {
                self.reconcile(&event, TransactionStatus::Succeeded).await
            }
            EventKind::PaymentFailed => self.reconcile(&event, TransactionStatus::Failed).await,
            EventKind::PaymentCanceled => self.reconcile(&event, TransactionStatus::Canceled).await,
            EventKind::PaymentRequiresAction => {
                self.reconcile(&event, TransactionStatus::RequiresAction)
                    .await
            }
            EventKind::DisputeCreated => Ok(self.log_dispute(&event)),
            EventKind::Unknown => {
                tracing::info!(event_type = %event.event_type, "Unhandled event type");
                Ok(Disposition::Logged)
            }
        }
    }

    /// Normalize the embedded payment intent, merge it into the store, and
    /// dispatch side effects for genuine transitions.
    async fn reconcile(
        &self,
        event: &WebhookEvent,
        status: TransactionStatus,
    ) -> Result<Disposition> {
        let object = match event.payment_object() {
            Ok(object) => object,
            Err(err) => {
                // Rejecting a signed delivery over payload shape only causes
                // indefinite redelivery; log it and acknowledge.
                tracing::warn!(
                    event_id = %event.id,
                    error = %err,
                    "Malformed payment object, acknowledging"
                );
                return Ok(Disposition::Malformed);
            }
        };

        if status == TransactionStatus::RequiresAction {
            tracing::info!(
                payment_intent_id = %object.id,
                next_action = object.next_action.as_deref().unwrap_or("unknown"),
                "Payment requires additional action"
            );
        }

        let record = TransactionRecord {
            id: object.id.clone(),
            amount: object.amount,
            currency: object.currency.clone(),
            status,
            created: object.created,
            payment_method: object.payment_method.clone(),
            metadata: object.metadata.clone(),
            failure_reason: if status == TransactionStatus::Failed {
                Some(
                    object
                        .failure_message
                        .clone()
                        .unwrap_or_else(|| "Unknown".to_string()),
                )
            } else {
                None
            },
            received_at: chrono::Utc::now().timestamp(),
        };

        let outcome = self.store.upsert(record.clone()).await?;

        match outcome {
            UpsertOutcome::StaleRegression { stored } => {
                tracing::warn!(
                    transaction_id = %record.id,
                    stored_status = stored.as_str(),
                    incoming_status = record.status.as_str(),
                    "Ignoring status regression from terminal state"
                );
                return Ok(Disposition::StaleIgnored);
            }
            UpsertOutcome::Duplicate => {
                tracing::info!(
                    transaction_id = %record.id,
                    status = record.status.as_str(),
                    "Duplicate delivery, no-op"
                );
                return Ok(Disposition::Duplicate);
            }
            UpsertOutcome::Inserted | UpsertOutcome::Transitioned { .. } => {}
        }

        tracing::info!(
            transaction_id = %record.id,
            status = record.status.as_str(),
            amount = record.amount,
            "Transaction recorded"
        );

        let dispatch = match record.status {
            TransactionStatus::Succeeded => Some(self.notifier.payment_succeeded(&record).await),
            TransactionStatus::Failed => Some(self.notifier.payment_failed(&record).await),
            // Logged only; notification channels for these are future work
            TransactionStatus::Canceled | TransactionStatus::RequiresAction => None,
        };

        match dispatch {
            Some(Ok(())) => Ok(Disposition::RecordedAndNotified),
            Some(Err(err)) => {
                // A local notification problem must not trigger redelivery;
                // the failure stays in the logs.
                tracing::error!(
                    transaction_id = %record.id,
                    error = %err,
                    "Notification dispatch failed"
                );
                Ok(Disposition::Recorded)
            }
            None => Ok(Disposition::Recorded),
        }
    }

    fn log_dispute(&self, event: &WebhookEvent) -> Disposition {
        match event.dispute_object() {
            Ok(dispute) => {
                tracing::warn!(
                    dispute_id = %dispute.id,
                    charge_id = %dispute.charge,
                    amount = dispute.amount,
                    reason = dispute.reason.as_deref().unwrap_or("unknown"),
                    "Chargeback created"
                );
                Disposition::Logged
            }
            Err(err) => {
                tracing::warn!(
                    event_id = %event.id,
                    error = %err,
                    "Malformed dispute object, acknowledging"
                );
                Disposition::Malformed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::MemoryTransactionStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    const SECRET: &str = "whsec_engine_test";

    /// Notifier that counts dispatches
    struct CountingNotifier {
        succeeded: AtomicU32,
        failed: AtomicU32,
    }

    impl CountingNotifier {
        fn new() -> Self {
            Self {
                succeeded: AtomicU32::new(0),
                failed: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn payment_succeeded(&self, _record: &TransactionRecord) -> anyhow::Result<()> {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn payment_failed(&self, _record: &TransactionRecord) -> anyhow::Result<()> {
            self.failed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Notifier whose dispatch always fails
    struct BrokenNotifier;

    #[async_trait]
    impl Notifier for BrokenNotifier {
        async fn payment_succeeded(&self, _record: &TransactionRecord) -> anyhow::Result<()> {
            anyhow::bail!("smtp down")
        }

        async fn payment_failed(&self, _record: &TransactionRecord) -> anyhow::Result<()> {
            anyhow::bail!("smtp down")
        }
    }

    fn signed_header(body: &[u8], secret: &str) -> String {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let timestamp = chrono::Utc::now().timestamp();
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(body);
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn event_body(event_type: &str, intent_id: &str, amount: i64) -> Vec<u8> {
        serde_json::json!({
            "id": format!("evt_{intent_id}_{event_type}"),
            "type": event_type,
            "created": 1_700_000_000,
            "livemode": false,
            "data": {
                "object": {
                    "id": intent_id,
                    "amount": amount,
                    "currency": "brl",
                    "created": 1_699_999_990,
                    "payment_method": "pm_1",
                    "metadata": {"order_id": "order_1"}
                }
            }
        })
        .to_string()
        .into_bytes()
    }

    struct Harness {
        engine: WebhookEngine,
        store: Arc<MemoryTransactionStore>,
        notifier: Arc<CountingNotifier>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryTransactionStore::new());
        let notifier = Arc::new(CountingNotifier::new());
        let engine = WebhookEngine::new(
            SignatureVerifier::new(SECRET),
            store.clone(),
            notifier.clone(),
        );
        Harness {
            engine,
            store,
            notifier,
        }
    }

    #[tokio::test]
    async fn succeeded_event_records_and_notifies_once() {
        let h = harness();
        let body = event_body("payment_intent.succeeded", "pi_1", 10000);
        let header = signed_header(&body, SECRET);

        let disposition = h.engine.process(&body, Some(&header)).await.unwrap();
        assert_eq!(disposition, Disposition::RecordedAndNotified);

        let record = h.store.get("pi_1").await.unwrap().unwrap();
        assert_eq!(record.status, TransactionStatus::Succeeded);
        assert_eq!(record.amount, 10000);
        assert_eq!(h.notifier.succeeded.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn redelivery_is_idempotent() {
        let h = harness();
        let body = event_body("payment_intent.succeeded", "pi_1", 10000);

        for round in 0..3 {
            let header = signed_header(&body, SECRET);
            let disposition = h.engine.process(&body, Some(&header)).await.unwrap();
            if round == 0 {
                assert_eq!(disposition, Disposition::RecordedAndNotified);
            } else {
                assert_eq!(disposition, Disposition::Duplicate);
            }
        }

        assert_eq!(h.notifier.succeeded.load(Ordering::SeqCst), 1);
        let record = h.store.get("pi_1").await.unwrap().unwrap();
        assert_eq!(record.status, TransactionStatus::Succeeded);
    }

    #[tokio::test]
    async fn late_requires_action_does_not_regress_a_settled_payment() {
        let h = harness();

        let settled = event_body("payment_intent.succeeded", "pi_1", 10000);
        let header = signed_header(&settled, SECRET);
        h.engine.process(&settled, Some(&header)).await.unwrap();

        let stale = event_body("payment_intent.requires_action", "pi_1", 10000);
        let header = signed_header(&stale, SECRET);
        let disposition = h.engine.process(&stale, Some(&header)).await.unwrap();

        assert_eq!(disposition, Disposition::StaleIgnored);
        let record = h.store.get("pi_1").await.unwrap().unwrap();
        assert_eq!(record.status, TransactionStatus::Succeeded);
        assert_eq!(h.notifier.succeeded.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_event_records_the_failure_reason_and_notifies() {
        let h = harness();
        let body = serde_json::json!({
            "id": "evt_fail",
            "type": "payment_intent.payment_failed",
            "created": 1_700_000_000,
            "data": {
                "object": {
                    "id": "pi_2",
                    "amount": 5000,
                    "currency": "brl",
                    "created": 1_699_999_990,
                    "last_payment_error": {"message": "Your card was declined."}
                }
            }
        })
        .to_string()
        .into_bytes();
        let header = signed_header(&body, SECRET);

        let disposition = h.engine.process(&body, Some(&header)).await.unwrap();
        assert_eq!(disposition, Disposition::RecordedAndNotified);

        let record = h.store.get("pi_2").await.unwrap().unwrap();
        assert_eq!(record.status, TransactionStatus::Failed);
        assert_eq!(
            record.failure_reason.as_deref(),
            Some("Your card was declined.")
        );
        assert_eq!(h.notifier.failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn canceled_event_is_recorded_without_notification() {
        let h = harness();
        let body = event_body("payment_intent.canceled", "pi_3", 7000);
        let header = signed_header(&body, SECRET);

        let disposition = h.engine.process(&body, Some(&header)).await.unwrap();
        assert_eq!(disposition, Disposition::Recorded);

        let record = h.store.get("pi_3").await.unwrap().unwrap();
        assert_eq!(record.status, TransactionStatus::Canceled);
        assert_eq!(h.notifier.succeeded.load(Ordering::SeqCst), 0);
        assert_eq!(h.notifier.failed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_signature_header_is_rejected() {
        let h = harness();
        let body = event_body("payment_intent.succeeded", "pi_1", 10000);

        assert!(matches!(
            h.engine.process(&body, None).await,
            Err(PaymentError::MissingSignature)
        ));
        assert!(matches!(
            h.engine.process(&body, Some("")).await,
            Err(PaymentError::MissingSignature)
        ));
        assert!(h.store.get("pi_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tampered_body_is_rejected_without_store_mutation() {
        let h = harness();
        let body = event_body("payment_intent.succeeded", "pi_1", 10000);
        let header = signed_header(&body, SECRET);
        let tampered = event_body("payment_intent.succeeded", "pi_1", 99999);

        assert!(matches!(
            h.engine.process(&tampered, Some(&header)).await,
            Err(PaymentError::InvalidSignature(_))
        ));
        assert!(h.store.get("pi_1").await.unwrap().is_none());
        assert_eq!(h.notifier.succeeded.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_event_type_is_acknowledged() {
        let h = harness();
        let body = serde_json::json!({
            "id": "evt_x",
            "type": "customer.subscription.created",
            "data": {"object": {}}
        })
        .to_string()
        .into_bytes();
        let header = signed_header(&body, SECRET);

        let disposition = h.engine.process(&body, Some(&header)).await.unwrap();
        assert_eq!(disposition, Disposition::Logged);
    }

    #[tokio::test]
    async fn malformed_payment_object_is_acknowledged() {
        let h = harness();
        // amount missing from the embedded object
        let body = serde_json::json!({
            "id": "evt_y",
            "type": "payment_intent.succeeded",
            "data": {"object": {"id": "pi_9", "currency": "brl", "created": 1}}
        })
        .to_string()
        .into_bytes();
        let header = signed_header(&body, SECRET);

        let disposition = h.engine.process(&body, Some(&header)).await.unwrap();
        assert_eq!(disposition, Disposition::Malformed);
        assert!(h.store.get("pi_9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dispute_event_is_logged_without_store_mutation() {
        let h = harness();
        let body = serde_json::json!({
            "id": "evt_d",
            "type": "charge.dispute.created",
            "data": {
                "object": {"id": "dp_1", "charge": "ch_1", "amount": 10000, "reason": "fraudulent"}
            }
        })
        .to_string()
        .into_bytes();
        let header = signed_header(&body, SECRET);

        let disposition = h.engine.process(&body, Some(&header)).await.unwrap();
        assert_eq!(disposition, Disposition::Logged);
        assert!(h.store.get("dp_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn notification_failure_still_acknowledges_the_delivery() {
        let store = Arc::new(MemoryTransactionStore::new());
        let engine = WebhookEngine::new(
            SignatureVerifier::new(SECRET),
            store.clone(),
            Arc::new(BrokenNotifier),
        );

        let body = event_body("payment_intent.succeeded", "pi_1", 10000);
        let header = signed_header(&body, SECRET);

        let disposition = engine.process(&body, Some(&header)).await.unwrap();
        assert_eq!(disposition, Disposition::Recorded);
        // Record still landed even though the notification channel is down
        assert!(store.get("pi_1").await.unwrap().is_some());
    }
}
