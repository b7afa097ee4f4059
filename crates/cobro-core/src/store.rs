//! # Record Store
//!
//! Port over the per-order record store plus the in-memory adapter.
//!
//! Implementations must behave as a linearizable per-key store: `create`
//! never overwrites, and `update_status` checks and writes atomically.
//! All cross-request coordination in the service goes through that
//! conditional write.

use crate::error::{CobroError, CobroResult};
use crate::record::{PaymentRecord, PaymentStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Mutation applied by a successful conditional update
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    /// Status to move the record to
    pub new_status: PaymentStatus,

    /// Event token recorded as `last_event_id`
    pub event_id: String,

    /// Processor payment id; applied only if the record has none yet
    pub external_payment_id: Option<String>,
}

impl StatusUpdate {
    pub fn new(new_status: PaymentStatus, event_id: impl Into<String>) -> Self {
        Self {
            new_status,
            event_id: event_id.into(),
            external_payment_id: None,
        }
    }

    /// Attach the processor payment id carried by the notification
    pub fn with_external_payment_id(mut self, id: impl Into<String>) -> Self {
        self.external_payment_id = Some(id.into());
        self
    }
}

/// Port over the payment-record store
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record keyed by its order id.
    /// Fails with `DuplicateKey` if the key is already taken; never upserts.
    async fn create(&self, record: PaymentRecord) -> CobroResult<()>;

    /// Fetch a record by order id. Fails with `NotFound` if absent.
    async fn get(&self, order_id: &str) -> CobroResult<PaymentRecord>;

    /// Resolve a record by the processor-assigned payment id.
    async fn find_by_external_id(
        &self,
        external_payment_id: &str,
    ) -> CobroResult<Option<PaymentRecord>>;

    /// Newest-first listing, at most `limit` records.
    async fn list(&self, limit: usize) -> CobroResult<Vec<PaymentRecord>>;

    /// Conditional status write. Fails with `NotFound` if the record is
    /// absent, with `ConflictingState` if the stored status is not in
    /// `expected`. On success applies `update` atomically and returns the
    /// updated record. `external_payment_id` is set at most once;
    /// `updated_at` never decreases.
    async fn update_status(
        &self,
        order_id: &str,
        expected: &[PaymentStatus],
        update: StatusUpdate,
    ) -> CobroResult<PaymentRecord>;
}

/// Shared handle to a record store (dynamic dispatch)
pub type SharedRecordStore = Arc<dyn RecordStore>;

/// In-memory store backed by a `HashMap` behind an async `RwLock`.
///
/// The conditional update runs entirely under the write lock, which is
/// what guarantees a single winner under concurrent conflicting
/// notifications for the same order.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    records: Arc<RwLock<HashMap<String, PaymentRecord>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, record: PaymentRecord) -> CobroResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.order_id) {
            return Err(CobroError::DuplicateKey {
                order_id: record.order_id.clone(),
            });
        }
        records.insert(record.order_id.clone(), record);
        Ok(())
    }

    async fn get(&self, order_id: &str) -> CobroResult<PaymentRecord> {
        self.records
            .read()
            .await
            .get(order_id)
            .cloned()
            .ok_or_else(|| CobroError::NotFound {
                id: order_id.to_string(),
            })
    }

    async fn find_by_external_id(
        &self,
        external_payment_id: &str,
    ) -> CobroResult<Option<PaymentRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|record| record.external_payment_id.as_deref() == Some(external_payment_id))
            .cloned())
    }

    async fn list(&self, limit: usize) -> CobroResult<Vec<PaymentRecord>> {
        let records = self.records.read().await;
        let mut all: Vec<PaymentRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        Ok(all)
    }

    async fn update_status(
        &self,
        order_id: &str,
        expected: &[PaymentStatus],
        update: StatusUpdate,
    ) -> CobroResult<PaymentRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(order_id)
            .ok_or_else(|| CobroError::NotFound {
                id: order_id.to_string(),
            })?;

        if !expected.contains(&record.status) {
            return Err(CobroError::ConflictingState {
                current: record.status,
                attempted: update.new_status,
            });
        }

        record.status = update.new_status;
        record.last_event_id = Some(update.event_id);
        if record.external_payment_id.is_none() {
            record.external_payment_id = update.external_payment_id;
        }
        // monotonic even if the wall clock steps backwards
        record.updated_at = Utc::now().max(record.updated_at);

        Ok(record.clone())
    }
}
