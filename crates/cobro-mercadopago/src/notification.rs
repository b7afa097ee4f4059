//! # Webhook Notifications
//!
//! Parsing and signature verification for inbound Mercado Pago
//! notifications. Two payload shapes share the endpoint: the standard
//! webhook (`type` plus `data.id`, resolved by fetching the payment
//! back) and a flat shape that already carries the record reference,
//! status and event token.

use cobro_core::{
    CobroError, CobroResult, Currency, IncomingNotification, PaymentStatus, RecordRef,
    StatusReport,
};
use serde_json::Value;
use tracing::debug;

/// Decode a webhook body into an `IncomingNotification`.
///
/// Recognized-but-unprocessed kinds (`type` other than `payment`) come
/// back as `Ignored`; structurally unusable bodies are
/// `MalformedPayload` errors for the caller to acknowledge.
pub fn parse_notification(body: &[u8]) -> CobroResult<IncomingNotification> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| CobroError::MalformedPayload(format!("invalid JSON: {}", e)))?;

    let object = value.as_object().ok_or_else(|| {
        CobroError::MalformedPayload("payload is not a JSON object".to_string())
    })?;

    // standard webhook shape: { "type": "payment", "data": { "id": ... } }
    if let Some(kind) = object.get("type").and_then(Value::as_str) {
        if kind != "payment" {
            return Ok(IncomingNotification::Ignored {
                kind: kind.to_string(),
            });
        }

        let payment_id = object
            .get("data")
            .and_then(|data| data.get("id"))
            .and_then(value_to_string)
            .ok_or_else(|| {
                CobroError::MalformedPayload(
                    "payment notification carries no data.id".to_string(),
                )
            })?;

        let event_id = object.get("id").and_then(value_to_string).ok_or_else(|| {
            CobroError::MalformedPayload("notification carries no id".to_string())
        })?;

        debug!(
            "parsed payment event: payment_id={}, event_id={}",
            payment_id, event_id
        );

        return Ok(IncomingNotification::PaymentEvent {
            payment_id,
            event_id,
        });
    }

    // flat shape: reference, status and event token in one object
    let status_code = object
        .get("status")
        .and_then(value_to_string)
        .ok_or_else(|| {
            CobroError::MalformedPayload("notification carries no status".to_string())
        })?;

    let status = PaymentStatus::from_code(&status_code).ok_or_else(|| {
        CobroError::MalformedPayload(format!("unknown payment status: {}", status_code))
    })?;

    let event_id = object
        .get("event_id")
        .or_else(|| object.get("id"))
        .and_then(value_to_string)
        .ok_or_else(|| {
            CobroError::MalformedPayload("notification carries no event id".to_string())
        })?;

    let external_payment_id = object.get("payment_id").and_then(value_to_string);

    let order_id = object
        .get("order_id")
        .or_else(|| object.get("external_reference"))
        .and_then(value_to_string);

    let reference = match (order_id, external_payment_id.as_ref()) {
        (Some(order_id), _) => RecordRef::OrderId(order_id),
        (None, Some(payment_id)) => RecordRef::ExternalPaymentId(payment_id.clone()),
        (None, None) => {
            return Err(CobroError::MalformedPayload(
                "notification names no order or payment".to_string(),
            ))
        }
    };

    let mut report = StatusReport::new(reference, status, event_id);
    report.external_payment_id = external_payment_id;

    // the amount check needs the currency to interpret minor units, so
    // one without the other is unusable
    match (object.get("amount"), object.get("currency")) {
        (Some(amount), Some(currency)) => {
            let code = value_to_string(currency).ok_or_else(|| {
                CobroError::MalformedPayload("currency is not a string".to_string())
            })?;
            let currency = Currency::from_code(&code).ok_or_else(|| {
                CobroError::MalformedPayload(format!("unknown currency: {}", code))
            })?;
            let amount = amount.as_f64().filter(|a| a.is_finite()).ok_or_else(|| {
                CobroError::MalformedPayload("amount is not a number".to_string())
            })?;
            report.amount = Some(currency.to_minor_units(amount));
            report.currency = Some(currency);
        }
        (None, None) => {}
        _ => {
            return Err(CobroError::MalformedPayload(
                "amount and currency must be sent together".to_string(),
            ))
        }
    }

    Ok(IncomingNotification::StatusReport(report))
}

/// Mercado Pago serializes ids inconsistently: numbers in webhook
/// bodies, strings in the payments API.
fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// =============================================================================
// Signature Verification
// =============================================================================

/// Default tolerance for the signed timestamp, in seconds
const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Verifies Mercado Pago `x-signature` headers.
///
/// The header carries `ts=<unix seconds>,v1=<hex hmac>`. The HMAC-SHA256
/// manifest is `id:{data.id};request-id:{x-request-id};ts:{ts};`, keyed
/// with the application's webhook secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Override the timestamp tolerance
    pub fn with_tolerance_secs(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verify a signature header against the manifest fields it signs
    pub fn verify(&self, signature: &str, request_id: &str, data_id: &str) -> CobroResult<()> {
        let parts = parse_signature_header(signature)?;

        let now = chrono::Utc::now().timestamp();
        if (now - parts.timestamp).abs() > self.tolerance_secs {
            return Err(CobroError::MalformedPayload(
                "signature timestamp outside tolerance".to_string(),
            ));
        }

        let manifest = signed_manifest(data_id, request_id, parts.timestamp);
        let expected = compute_hmac_sha256(&self.secret, &manifest);

        let valid = parts
            .signatures
            .iter()
            .any(|sig| constant_time_compare(sig, &expected));

        if !valid {
            return Err(CobroError::MalformedPayload(
                "signature mismatch".to_string(),
            ));
        }

        Ok(())
    }

    /// Produce a header over the given manifest fields, the way Mercado
    /// Pago signs deliveries. Used by tests and local webhook tooling.
    pub fn sign(&self, request_id: &str, data_id: &str, timestamp: i64) -> String {
        let manifest = signed_manifest(data_id, request_id, timestamp);
        format!(
            "ts={},v1={}",
            timestamp,
            compute_hmac_sha256(&self.secret, &manifest)
        )
    }
}

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

fn parse_signature_header(header: &str) -> CobroResult<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let kv: Vec<&str> = part.split('=').collect();
        if kv.len() != 2 {
            continue;
        }
        match kv[0].trim() {
            "ts" => {
                timestamp = kv[1].trim().parse().ok();
            }
            "v1" => {
                signatures.push(kv[1].trim().to_string());
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        CobroError::MalformedPayload("signature header carries no timestamp".to_string())
    })?;

    if signatures.is_empty() {
        return Err(CobroError::MalformedPayload(
            "signature header carries no v1 signature".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

// alphanumeric data ids are lowercased in the signed manifest
fn signed_manifest(data_id: &str, request_id: &str, timestamp: i64) -> String {
    format!(
        "id:{};request-id:{};ts:{};",
        data_id.to_lowercase(),
        request_id,
        timestamp
    )
}

fn compute_hmac_sha256(secret: &str, message: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    let result = mac.finalize();
    hex::encode(result.into_bytes())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}
