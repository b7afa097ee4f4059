//! # Webhook Reconciliation
//!
//! Folds processor notifications into payment records. Deliveries are
//! at-least-once and arrive in no particular order, so every
//! notification is reduced to one conditional status write plus a
//! classification of what happened. Business anomalies (duplicates,
//! conflicting transitions, unknown orders) come back as `Ok` outcomes so
//! the HTTP layer can acknowledge the delivery; `Err` carries fetch and
//! store failures, of which only the retryable upstream kind
//! (`CobroError::is_retryable`) is worth asking the processor to
//! redeliver.

use crate::currency::Currency;
use crate::error::{CobroError, CobroResult};
use crate::processor::SharedProcessor;
use crate::record::{PaymentRecord, PaymentStatus};
use crate::store::{SharedRecordStore, StatusUpdate};
use tracing::{debug, info, warn};

/// How a notification refers to its record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordRef {
    /// Our order id (the record key)
    OrderId(String),
    /// Processor payment id, resolved via a secondary lookup
    ExternalPaymentId(String),
}

impl RecordRef {
    pub fn as_str(&self) -> &str {
        match self {
            RecordRef::OrderId(id) | RecordRef::ExternalPaymentId(id) => id,
        }
    }
}

impl std::fmt::Display for RecordRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordRef::OrderId(id) => write!(f, "order {id}"),
            RecordRef::ExternalPaymentId(id) => write!(f, "payment {id}"),
        }
    }
}

/// A notification already reduced to (reference, status, event token)
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub reference: RecordRef,

    /// Target status reported by the processor
    pub status: PaymentStatus,

    /// Opaque delivery token; equal tokens are the same event
    pub event_id: String,

    /// Processor payment id, when the payload carries one
    pub external_payment_id: Option<String>,

    /// Settled amount in minor units, for the mismatch check
    pub amount: Option<i64>,

    /// Settlement currency, for the mismatch check
    pub currency: Option<Currency>,
}

impl StatusReport {
    pub fn new(reference: RecordRef, status: PaymentStatus, event_id: impl Into<String>) -> Self {
        Self {
            reference,
            status,
            event_id: event_id.into(),
            external_payment_id: None,
            amount: None,
            currency: None,
        }
    }
}

/// A parsed inbound notification
#[derive(Debug, Clone)]
pub enum IncomingNotification {
    /// Processor event naming only a payment id; the payment object must
    /// be fetched back to learn the order and status
    PaymentEvent { payment_id: String, event_id: String },

    /// Payload already carrying reference, status and token
    StatusReport(StatusReport),

    /// Recognized notification kind we do not process
    Ignored { kind: String },
}

/// Outcome of reconciling one notification
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// The conditional write landed
    Applied {
        previous: PaymentStatus,
        record: PaymentRecord,
    },

    /// Replayed event token or a status the record already holds;
    /// nothing written
    Duplicate { order_id: String, event_id: String },

    /// The stored status does not admit the transition, or the payload
    /// disagrees with the record; nothing written
    Conflicting {
        order_id: String,
        current: PaymentStatus,
        incoming: PaymentStatus,
    },

    /// No record matches the reference; nothing written
    UnknownRecord { reference: String },

    /// Notification kind we do not process
    Ignored { kind: String },
}

impl ReconcileOutcome {
    /// True only when a write landed
    pub fn was_applied(&self) -> bool {
        matches!(self, ReconcileOutcome::Applied { .. })
    }
}

/// Reconciles webhook notifications into the record store
pub struct WebhookReconciler {
    store: SharedRecordStore,
    processor: SharedProcessor,
}

impl WebhookReconciler {
    pub fn new(store: SharedRecordStore, processor: SharedProcessor) -> Self {
        Self { store, processor }
    }

    /// Reconcile one parsed notification.
    ///
    /// `Err` means the outcome is unknown (processor lookup or store
    /// failed); everything the service could decide is an `Ok` outcome.
    pub async fn handle(&self, notification: IncomingNotification) -> CobroResult<ReconcileOutcome> {
        match notification {
            IncomingNotification::Ignored { kind } => {
                debug!("ignoring notification kind: {}", kind);
                Ok(ReconcileOutcome::Ignored { kind })
            }
            IncomingNotification::PaymentEvent {
                payment_id,
                event_id,
            } => match self.resolve_payment_event(&payment_id, event_id).await? {
                Some(report) => self.apply_report(report).await,
                None => {
                    warn!(
                        "processor {} has no payment {}, acknowledging without record",
                        self.processor.processor_name(),
                        payment_id
                    );
                    Ok(ReconcileOutcome::UnknownRecord {
                        reference: payment_id,
                    })
                }
            },
            IncomingNotification::StatusReport(report) => self.apply_report(report).await,
        }
    }

    /// Turn a bare payment event into a status report by fetching the
    /// payment object back from the processor. `Ok(None)` means the
    /// processor does not know the payment id.
    async fn resolve_payment_event(
        &self,
        payment_id: &str,
        event_id: String,
    ) -> CobroResult<Option<StatusReport>> {
        let payment = match self.processor.fetch_payment(payment_id).await {
            Ok(payment) => payment,
            Err(CobroError::NotFound { .. }) => return Ok(None),
            Err(err) => return Err(err),
        };

        let reference = match payment.external_reference {
            Some(order_id) => RecordRef::OrderId(order_id),
            None => RecordRef::ExternalPaymentId(payment.payment_id.clone()),
        };

        Ok(Some(StatusReport {
            reference,
            status: payment.status,
            event_id,
            external_payment_id: Some(payment.payment_id),
            amount: payment.amount,
            currency: payment.currency,
        }))
    }

    async fn apply_report(&self, report: StatusReport) -> CobroResult<ReconcileOutcome> {
        let record = match self.resolve_record(&report.reference).await? {
            Some(record) => record,
            None => {
                warn!(
                    "notification for unknown record: {} (event {})",
                    report.reference, report.event_id
                );
                return Ok(ReconcileOutcome::UnknownRecord {
                    reference: report.reference.as_str().to_string(),
                });
            }
        };

        // replayed delivery of an already-applied event
        if record.last_event_id.as_deref() == Some(report.event_id.as_str()) {
            debug!(
                "duplicate event {} for order {}, no-op",
                report.event_id, record.order_id
            );
            return Ok(ReconcileOutcome::Duplicate {
                order_id: record.order_id,
                event_id: report.event_id,
            });
        }

        // a payload that disagrees with the record never overwrites it
        if let Some(reason) = mismatch_reason(&record, &report) {
            warn!(
                "notification disagrees with record {}: {} (event {})",
                record.order_id, reason, report.event_id
            );
            return Ok(ReconcileOutcome::Conflicting {
                order_id: record.order_id,
                current: record.status,
                incoming: report.status,
            });
        }

        // a status the record already holds is an idempotent no-op
        if record.status == report.status {
            debug!(
                "order {} already {}, event {} is a no-op",
                record.order_id, record.status, report.event_id
            );
            return Ok(ReconcileOutcome::Duplicate {
                order_id: record.order_id,
                event_id: report.event_id,
            });
        }

        let expected = PaymentStatus::sources_of(report.status);
        let mut update = StatusUpdate::new(report.status, report.event_id.clone());
        if let Some(payment_id) = &report.external_payment_id {
            update = update.with_external_payment_id(payment_id.clone());
        }

        match self
            .store
            .update_status(&record.order_id, &expected, update)
            .await
        {
            Ok(updated) => {
                info!(
                    "order {} moved {} -> {} (event {})",
                    updated.order_id, record.status, updated.status, report.event_id
                );
                Ok(ReconcileOutcome::Applied {
                    previous: record.status,
                    record: updated,
                })
            }
            Err(CobroError::ConflictingState { current, attempted }) if current == attempted => {
                // lost a race to an equivalent event; the record already
                // reflects this state
                debug!(
                    "order {} already {} after race, event {} is a no-op",
                    record.order_id, current, report.event_id
                );
                Ok(ReconcileOutcome::Duplicate {
                    order_id: record.order_id,
                    event_id: report.event_id,
                })
            }
            Err(CobroError::ConflictingState { current, attempted }) => {
                warn!(
                    "conflicting transition for order {}: record is {}, notification wants {} (event {})",
                    record.order_id, current, attempted, report.event_id
                );
                Ok(ReconcileOutcome::Conflicting {
                    order_id: record.order_id,
                    current,
                    incoming: attempted,
                })
            }
            Err(CobroError::NotFound { id }) => Ok(ReconcileOutcome::UnknownRecord {
                reference: id,
            }),
            Err(err) => Err(err),
        }
    }

    async fn resolve_record(&self, reference: &RecordRef) -> CobroResult<Option<PaymentRecord>> {
        match reference {
            RecordRef::OrderId(order_id) => match self.store.get(order_id).await {
                Ok(record) => Ok(Some(record)),
                Err(CobroError::NotFound { .. }) => Ok(None),
                Err(err) => Err(err),
            },
            RecordRef::ExternalPaymentId(payment_id) => {
                self.store.find_by_external_id(payment_id).await
            }
        }
    }
}

/// A mismatch between what the notification claims and what the record
/// holds. Amount and currency are immutable after creation, and the
/// external payment id is immutable once stamped.
fn mismatch_reason(record: &PaymentRecord, report: &StatusReport) -> Option<String> {
    if let (Some(stamped), Some(claimed)) = (
        record.external_payment_id.as_deref(),
        report.external_payment_id.as_deref(),
    ) {
        if stamped != claimed {
            return Some(format!(
                "payment id {claimed} does not match recorded {stamped}"
            ));
        }
    }
    if let Some(amount) = report.amount {
        if amount != record.amount {
            return Some(format!(
                "amount {amount} does not match recorded {}",
                record.amount
            ));
        }
    }
    if let Some(currency) = report.currency {
        if currency != record.currency {
            return Some(format!(
                "currency {currency} does not match recorded {}",
                record.currency
            ));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{IssuedLink, LinkRequest, PaymentProcessor, ProcessorPayment};
    use crate::store::{MemoryRecordStore, RecordStore};
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Processor stub: serves one canned payment object, or errors
    struct StubProcessor {
        payment: Option<ProcessorPayment>,
        unavailable: bool,
    }

    impl StubProcessor {
        fn empty() -> Self {
            Self {
                payment: None,
                unavailable: false,
            }
        }

        fn with_payment(payment: ProcessorPayment) -> Self {
            Self {
                payment: Some(payment),
                unavailable: false,
            }
        }

        fn unavailable() -> Self {
            Self {
                payment: None,
                unavailable: true,
            }
        }
    }

    #[async_trait]
    impl PaymentProcessor for StubProcessor {
        async fn create_link(&self, request: &LinkRequest) -> CobroResult<IssuedLink> {
            Ok(IssuedLink {
                link_url: format!("https://mp.example/{}", request.order_id),
                preference_id: Some("pref-1".into()),
                external_payment_id: None,
            })
        }

        async fn fetch_payment(&self, payment_id: &str) -> CobroResult<ProcessorPayment> {
            if self.unavailable {
                return Err(CobroError::UpstreamUnavailable {
                    message: "connection refused".into(),
                });
            }
            self.payment
                .clone()
                .filter(|payment| payment.payment_id == payment_id)
                .ok_or_else(|| CobroError::NotFound {
                    id: payment_id.to_string(),
                })
        }

        fn processor_name(&self) -> &'static str {
            "stub"
        }
    }

    fn reconciler_with(
        processor: StubProcessor,
    ) -> (Arc<MemoryRecordStore>, WebhookReconciler) {
        let store = Arc::new(MemoryRecordStore::new());
        let reconciler = WebhookReconciler::new(store.clone(), Arc::new(processor));
        (store, reconciler)
    }

    async fn seed(store: &MemoryRecordStore, order_id: &str) {
        let record =
            PaymentRecord::new(order_id, 10000, Currency::ARS, "https://mp.example/init");
        store.create(record).await.unwrap();
    }

    fn approve(order_id: &str, event_id: &str) -> IncomingNotification {
        IncomingNotification::StatusReport(StatusReport::new(
            RecordRef::OrderId(order_id.into()),
            PaymentStatus::Approved,
            event_id,
        ))
    }

    #[tokio::test]
    async fn applies_approval_to_pending_record() {
        let (store, reconciler) = reconciler_with(StubProcessor::empty());
        seed(&store, "A1").await;

        let outcome = reconciler.handle(approve("A1", "ev1")).await.unwrap();

        assert!(outcome.was_applied());
        let record = store.get("A1").await.unwrap();
        assert_eq!(record.status, PaymentStatus::Approved);
        assert_eq!(record.last_event_id.as_deref(), Some("ev1"));
    }

    #[tokio::test]
    async fn replayed_event_token_is_a_no_op() {
        let (store, reconciler) = reconciler_with(StubProcessor::empty());
        seed(&store, "A1").await;

        reconciler.handle(approve("A1", "ev1")).await.unwrap();
        let before = store.get("A1").await.unwrap();

        let outcome = reconciler.handle(approve("A1", "ev1")).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Duplicate { .. }));

        let after = store.get("A1").await.unwrap();
        assert_eq!(after.status, before.status);
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(after.last_event_id, before.last_event_id);
    }

    #[tokio::test]
    async fn same_status_with_new_token_is_a_no_op() {
        let (store, reconciler) = reconciler_with(StubProcessor::empty());
        seed(&store, "A1").await;

        reconciler.handle(approve("A1", "ev1")).await.unwrap();
        let outcome = reconciler.handle(approve("A1", "ev2")).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Duplicate { .. }));
        // zero writes: the token of the applied event is still recorded
        let record = store.get("A1").await.unwrap();
        assert_eq!(record.last_event_id.as_deref(), Some("ev1"));
    }

    #[tokio::test]
    async fn full_lifecycle_a1() {
        let (store, reconciler) = reconciler_with(StubProcessor::empty());
        seed(&store, "A1").await;
        assert_eq!(store.get("A1").await.unwrap().status, PaymentStatus::Pending);

        // approved, ev1
        let outcome = reconciler.handle(approve("A1", "ev1")).await.unwrap();
        assert!(outcome.was_applied());
        let record = store.get("A1").await.unwrap();
        assert_eq!(record.status, PaymentStatus::Approved);
        assert_eq!(record.last_event_id.as_deref(), Some("ev1"));

        // ev1 replayed
        let outcome = reconciler.handle(approve("A1", "ev1")).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Duplicate { .. }));

        // refunded, ev2
        let refund = IncomingNotification::StatusReport(StatusReport::new(
            RecordRef::OrderId("A1".into()),
            PaymentStatus::Refunded,
            "ev2",
        ));
        let outcome = reconciler.handle(refund).await.unwrap();
        assert!(outcome.was_applied());
        assert_eq!(store.get("A1").await.unwrap().status, PaymentStatus::Refunded);

        // rejected, ev3: terminal record, conflicting, unchanged
        let reject = IncomingNotification::StatusReport(StatusReport::new(
            RecordRef::OrderId("A1".into()),
            PaymentStatus::Rejected,
            "ev3",
        ));
        let outcome = reconciler.handle(reject).await.unwrap();
        match outcome {
            ReconcileOutcome::Conflicting {
                current, incoming, ..
            } => {
                assert_eq!(current, PaymentStatus::Refunded);
                assert_eq!(incoming, PaymentStatus::Rejected);
            }
            other => panic!("expected conflicting outcome, got {other:?}"),
        }
        let record = store.get("A1").await.unwrap();
        assert_eq!(record.status, PaymentStatus::Refunded);
        assert_eq!(record.last_event_id.as_deref(), Some("ev2"));
    }

    #[tokio::test]
    async fn unknown_order_is_acknowledged_without_a_record() {
        let (store, reconciler) = reconciler_with(StubProcessor::empty());

        let outcome = reconciler.handle(approve("ZZZ", "ev9")).await.unwrap();
        assert!(matches!(
            outcome,
            ReconcileOutcome::UnknownRecord { ref reference } if reference == "ZZZ"
        ));
        // no record materializes
        assert!(store.get("ZZZ").await.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn resolves_record_by_external_payment_id() {
        let (store, reconciler) = reconciler_with(StubProcessor::empty());
        seed(&store, "A1").await;

        let mut first = StatusReport::new(
            RecordRef::OrderId("A1".into()),
            PaymentStatus::Approved,
            "ev1",
        );
        first.external_payment_id = Some("mp-999".into());
        reconciler
            .handle(IncomingNotification::StatusReport(first))
            .await
            .unwrap();

        let refund = StatusReport::new(
            RecordRef::ExternalPaymentId("mp-999".into()),
            PaymentStatus::Refunded,
            "ev2",
        );
        let outcome = reconciler
            .handle(IncomingNotification::StatusReport(refund))
            .await
            .unwrap();

        assert!(outcome.was_applied());
        assert_eq!(store.get("A1").await.unwrap().status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn amount_mismatch_conflicts_without_writing() {
        let (store, reconciler) = reconciler_with(StubProcessor::empty());
        seed(&store, "A1").await;

        let mut report = StatusReport::new(
            RecordRef::OrderId("A1".into()),
            PaymentStatus::Approved,
            "ev1",
        );
        report.amount = Some(99999);
        let outcome = reconciler
            .handle(IncomingNotification::StatusReport(report))
            .await
            .unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Conflicting { .. }));
        let record = store.get("A1").await.unwrap();
        assert_eq!(record.status, PaymentStatus::Pending);
        assert_eq!(record.last_event_id, None);
    }

    #[tokio::test]
    async fn payment_event_resolves_through_processor_fetch() {
        let payment = ProcessorPayment {
            payment_id: "mp-999".into(),
            external_reference: Some("A1".into()),
            status: PaymentStatus::Approved,
            amount: Some(10000),
            currency: Some(Currency::ARS),
        };
        let (store, reconciler) = reconciler_with(StubProcessor::with_payment(payment));
        seed(&store, "A1").await;

        let outcome = reconciler
            .handle(IncomingNotification::PaymentEvent {
                payment_id: "mp-999".into(),
                event_id: "ev1".into(),
            })
            .await
            .unwrap();

        assert!(outcome.was_applied());
        let record = store.get("A1").await.unwrap();
        assert_eq!(record.status, PaymentStatus::Approved);
        assert_eq!(record.external_payment_id.as_deref(), Some("mp-999"));
    }

    #[tokio::test]
    async fn payment_event_for_unknown_payment_is_acknowledged() {
        let (store, reconciler) = reconciler_with(StubProcessor::empty());
        seed(&store, "A1").await;

        let outcome = reconciler
            .handle(IncomingNotification::PaymentEvent {
                payment_id: "mp-404".into(),
                event_id: "ev1".into(),
            })
            .await
            .unwrap();

        assert!(matches!(outcome, ReconcileOutcome::UnknownRecord { .. }));
        assert_eq!(store.get("A1").await.unwrap().status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn processor_outage_propagates_as_error() {
        let (store, reconciler) = reconciler_with(StubProcessor::unavailable());
        seed(&store, "A1").await;

        let err = reconciler
            .handle(IncomingNotification::PaymentEvent {
                payment_id: "mp-999".into(),
                event_id: "ev1".into(),
            })
            .await
            .unwrap_err();

        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn ignored_kind_passes_through() {
        let (_, reconciler) = reconciler_with(StubProcessor::empty());

        let outcome = reconciler
            .handle(IncomingNotification::Ignored {
                kind: "plan".into(),
            })
            .await
            .unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Ignored { ref kind } if kind == "plan"));
    }

    #[tokio::test]
    async fn concurrent_conflicting_notifications_single_winner() {
        let (store, reconciler) = reconciler_with(StubProcessor::empty());
        seed(&store, "A1").await;
        let reconciler = Arc::new(reconciler);

        let approve_task = {
            let reconciler = reconciler.clone();
            tokio::spawn(async move { reconciler.handle(approve("A1", "ev-a")).await })
        };
        let reject_task = {
            let reconciler = reconciler.clone();
            tokio::spawn(async move {
                reconciler
                    .handle(IncomingNotification::StatusReport(StatusReport::new(
                        RecordRef::OrderId("A1".into()),
                        PaymentStatus::Rejected,
                        "ev-b",
                    )))
                    .await
            })
        };

        let first = approve_task.await.unwrap().unwrap();
        let second = reject_task.await.unwrap().unwrap();

        let applied = first.was_applied() as u8 + second.was_applied() as u8;
        assert_eq!(applied, 1, "exactly one notification must land");

        let record = store.get("A1").await.unwrap();
        let (winner_status, winner_event) = if first.was_applied() {
            (PaymentStatus::Approved, "ev-a")
        } else {
            (PaymentStatus::Rejected, "ev-b")
        };
        assert_eq!(record.status, winner_status);
        assert_eq!(record.last_event_id.as_deref(), Some(winner_event));
    }
}
