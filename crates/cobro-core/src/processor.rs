//! # Payment Processor Port
//!
//! Seam between the record lifecycle and the external payment processor.
//! The shipped implementation is the Mercado Pago client in
//! `cobro-mercadopago`; tests substitute stubs.

use crate::currency::Currency;
use crate::error::CobroResult;
use crate::record::PaymentStatus;
use async_trait::async_trait;
use std::sync::Arc;

/// Request to issue a payment-collection link
#[derive(Debug, Clone)]
pub struct LinkRequest {
    /// Our order id, echoed back by the processor as the external reference
    pub order_id: String,

    /// Amount in minor currency units
    pub amount: i64,

    /// Settlement currency
    pub currency: Currency,

    /// Free-form description shown on the hosted page
    pub description: Option<String>,
}

/// A freshly issued payment link
#[derive(Debug, Clone)]
pub struct IssuedLink {
    /// Hosted URL the payer is sent to
    pub link_url: String,

    /// Processor preference id, when assigned synchronously
    pub preference_id: Option<String>,

    /// Processor payment id. Most processors assign this only once the
    /// payer interacts with the link, so this is usually `None` and the
    /// id arrives later via webhook.
    pub external_payment_id: Option<String>,
}

/// A payment object fetched back from the processor
#[derive(Debug, Clone)]
pub struct ProcessorPayment {
    /// Processor payment id
    pub payment_id: String,

    /// Our order id, as echoed back by the processor
    pub external_reference: Option<String>,

    /// Payment status as the processor reports it
    pub status: PaymentStatus,

    /// Settled amount in minor units, when reported
    pub amount: Option<i64>,

    /// Settlement currency, when reported
    pub currency: Option<Currency>,
}

/// Core trait for payment processor integrations.
///
/// Calls never retry internally; transport and provider failures surface
/// as `UpstreamUnavailable` and the caller decides what to do.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Create a hosted payment link for an order.
    ///
    /// Fails with `InvalidRequest` for unusable input (non-positive
    /// amount) before any network call is made.
    async fn create_link(&self, request: &LinkRequest) -> CobroResult<IssuedLink>;

    /// Fetch a payment object by processor payment id.
    ///
    /// Fails with `NotFound` when the processor does not know the id.
    async fn fetch_payment(&self, payment_id: &str) -> CobroResult<ProcessorPayment>;

    /// Processor name, for logging
    fn processor_name(&self) -> &'static str;
}

/// Shared handle to a processor (dynamic dispatch)
pub type SharedProcessor = Arc<dyn PaymentProcessor>;
