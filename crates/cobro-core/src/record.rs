//! # Payment Records
//!
//! The per-order payment record and its status lifecycle.
//!
//! A record is created in `pending` when a payment link is issued and is
//! only ever mutated by webhook reconciliation. The status machine below
//! is the single authority on which moves are legal.

use crate::currency::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a payment record.
///
/// Codes match the processor's payment states on the wire
/// (`snake_case`, e.g. `in_process`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Link issued, no payer interaction yet
    Pending,
    /// Processor is still deciding (e.g. offline payment under review)
    InProcess,
    /// Payment collected
    Approved,
    /// Processor declined the payment
    Rejected,
    /// Payer or processor cancelled before collection
    Cancelled,
    /// Collected and later returned to the payer
    Refunded,
}

impl PaymentStatus {
    /// Every status, in declaration order
    pub const ALL: [PaymentStatus; 6] = [
        PaymentStatus::Pending,
        PaymentStatus::InProcess,
        PaymentStatus::Approved,
        PaymentStatus::Rejected,
        PaymentStatus::Cancelled,
        PaymentStatus::Refunded,
    ];

    /// Returns the wire code for this status
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::InProcess => "in_process",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Parse a processor status code. Unknown codes are `None`; callers
    /// must fail closed rather than guess.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "pending" => Some(PaymentStatus::Pending),
            "in_process" => Some(PaymentStatus::InProcess),
            "approved" => Some(PaymentStatus::Approved),
            "rejected" => Some(PaymentStatus::Rejected),
            "cancelled" => Some(PaymentStatus::Cancelled),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }

    /// Exhaustive transition table. Every allowed edge is listed explicitly.
    /// If it's not here, it's not allowed.
    pub fn can_transition_to(&self, new: &Self) -> bool {
        matches!(
            (self, new),
            (Self::Pending, Self::InProcess)
                | (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
                | (Self::Pending, Self::Cancelled)
                | (Self::Pending, Self::Refunded)
                | (Self::InProcess, Self::Approved)
                | (Self::InProcess, Self::Rejected)
                | (Self::InProcess, Self::Cancelled)
                | (Self::Approved, Self::Refunded)
        )
    }

    /// Statuses from which `target` is reachable in one transition.
    /// Used as the expected-status set for conditional writes.
    pub fn sources_of(target: PaymentStatus) -> Vec<PaymentStatus> {
        Self::ALL
            .iter()
            .copied()
            .filter(|from| from.can_transition_to(&target))
            .collect()
    }

    /// Terminal statuses admit no further transitions.
    /// `approved` is not terminal: it may still move to `refunded`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Rejected | PaymentStatus::Cancelled | PaymentStatus::Refunded
        )
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A payment-collection record, keyed by order id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Our order identifier (caller-supplied or generated)
    pub order_id: String,

    /// Payment id assigned by the processor. Unknown at creation;
    /// stamped by the first notification that carries it and immutable
    /// after that.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_payment_id: Option<String>,

    /// Processor preference id returned when the link was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preference_id: Option<String>,

    /// Amount in minor currency units
    pub amount: i64,

    /// Settlement currency
    pub currency: Currency,

    /// Free-form description shown on the hosted link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Lifecycle status
    #[serde(default)]
    pub status: PaymentStatus,

    /// Hosted payment link URL the payer is sent to
    pub payment_link_url: String,

    /// Token of the last applied webhook event, for duplicate detection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<String>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp (never decreases)
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Create a new pending record for a freshly issued link
    pub fn new(
        order_id: impl Into<String>,
        amount: i64,
        currency: Currency,
        payment_link_url: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            order_id: order_id.into(),
            external_payment_id: None,
            preference_id: None,
            amount,
            currency,
            description: None,
            status: PaymentStatus::Pending,
            payment_link_url: payment_link_url.into(),
            last_event_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Generate a fresh order id for callers that did not supply one
    pub fn generate_order_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the processor preference id
    pub fn with_preference_id(mut self, preference_id: impl Into<String>) -> Self {
        self.preference_id = Some(preference_id.into());
        self
    }

    /// Decimal amount in major units (for API projections)
    pub fn amount_decimal(&self) -> f64 {
        self.currency.from_minor_units(self.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_transition_valid_paths() {
        use PaymentStatus::*;
        assert!(Pending.can_transition_to(&InProcess));
        assert!(Pending.can_transition_to(&Approved));
        assert!(Pending.can_transition_to(&Rejected));
        assert!(Pending.can_transition_to(&Cancelled));
        assert!(Pending.can_transition_to(&Refunded));
        assert!(InProcess.can_transition_to(&Approved));
        assert!(InProcess.can_transition_to(&Rejected));
        assert!(InProcess.can_transition_to(&Cancelled));
        assert!(Approved.can_transition_to(&Refunded));
    }

    #[test]
    fn can_transition_invalid_paths() {
        use PaymentStatus::*;
        // same status
        assert!(!Pending.can_transition_to(&Pending));
        assert!(!Approved.can_transition_to(&Approved));
        // backwards
        assert!(!Approved.can_transition_to(&Pending));
        assert!(!InProcess.can_transition_to(&Pending));
        assert!(!Refunded.can_transition_to(&Approved));
        // refunds require an approval first
        assert!(!InProcess.can_transition_to(&Refunded));
        assert!(!Rejected.can_transition_to(&Refunded));
        // terminal
        assert!(!Rejected.can_transition_to(&Approved));
        assert!(!Cancelled.can_transition_to(&Approved));
        assert!(!Refunded.can_transition_to(&Pending));
        assert!(!Refunded.can_transition_to(&Rejected));
    }

    #[test]
    fn terminal_statuses() {
        use PaymentStatus::*;
        assert!(Rejected.is_terminal());
        assert!(Cancelled.is_terminal());
        assert!(Refunded.is_terminal());
        assert!(!Pending.is_terminal());
        assert!(!InProcess.is_terminal());
        assert!(!Approved.is_terminal());
    }

    #[test]
    fn sources_of_matches_transition_table() {
        use PaymentStatus::*;
        assert_eq!(sorted(PaymentStatus::sources_of(Approved)), sorted(vec![Pending, InProcess]));
        assert_eq!(sorted(PaymentStatus::sources_of(Refunded)), sorted(vec![Pending, Approved]));
        assert_eq!(sorted(PaymentStatus::sources_of(InProcess)), vec![Pending]);
        assert!(PaymentStatus::sources_of(Pending).is_empty());
    }

    fn sorted(mut statuses: Vec<PaymentStatus>) -> Vec<PaymentStatus> {
        statuses.sort_by_key(|s| s.as_str());
        statuses
    }

    #[test]
    fn status_code_roundtrip() {
        for status in PaymentStatus::ALL {
            let parsed = PaymentStatus::from_code(status.as_str());
            assert_eq!(parsed, Some(status));
        }
    }

    #[test]
    fn status_from_unknown_code_is_none() {
        assert_eq!(PaymentStatus::from_code("charged_back"), None);
        assert_eq!(PaymentStatus::from_code("APPROVED"), None);
        assert_eq!(PaymentStatus::from_code(""), None);
    }

    #[test]
    fn new_record_starts_pending() {
        let record = PaymentRecord::new("A1", 10000, Currency::ARS, "https://mp.example/init")
            .with_description("Order A1")
            .with_preference_id("pref-1");

        assert_eq!(record.status, PaymentStatus::Pending);
        assert_eq!(record.external_payment_id, None);
        assert_eq!(record.last_event_id, None);
        assert_eq!(record.preference_id.as_deref(), Some("pref-1"));
        assert_eq!(record.amount_decimal(), 100.0);
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn record_serde_uses_wire_codes() {
        let record = PaymentRecord::new("A1", 10000, Currency::ARS, "https://mp.example/init");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["status"], "pending");
        assert_eq!(json["currency"], "ARS");
        assert!(json.get("external_payment_id").is_none());
    }
}
