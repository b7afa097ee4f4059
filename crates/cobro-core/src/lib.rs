//! # cobro-core
//!
//! Core types and traits for the cobro payment-link service.
//!
//! This crate provides:
//! - `PaymentRecord` and `PaymentStatus` for the per-order lifecycle
//! - `RecordStore` port plus `MemoryRecordStore`, the in-memory adapter
//! - `PaymentProcessor` trait for payment-processor integrations
//! - `WebhookReconciler` for folding notifications into records
//! - `CobroError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use cobro_core::{
//!     Currency, IncomingNotification, MemoryRecordStore, PaymentRecord,
//!     WebhookReconciler,
//! };
//! use std::sync::Arc;
//!
//! // Persist a record for a freshly issued link
//! let store = Arc::new(MemoryRecordStore::new());
//! let record = PaymentRecord::new("A1", 10_000, Currency::ARS, link.link_url);
//! store.create(record).await?;
//!
//! // Fold a processor notification into the record
//! let reconciler = WebhookReconciler::new(store, processor);
//! let outcome = reconciler.handle(notification).await?;
//! ```

pub mod currency;
pub mod error;
pub mod processor;
pub mod reconcile;
pub mod record;
pub mod store;

// Re-exports for convenience
pub use currency::Currency;
pub use error::{CobroError, CobroResult};
pub use processor::{
    IssuedLink, LinkRequest, PaymentProcessor, ProcessorPayment, SharedProcessor,
};
pub use reconcile::{
    IncomingNotification, ReconcileOutcome, RecordRef, StatusReport, WebhookReconciler,
};
pub use record::{PaymentRecord, PaymentStatus};
pub use store::{MemoryRecordStore, RecordStore, SharedRecordStore, StatusUpdate};
