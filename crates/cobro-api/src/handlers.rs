//! # Request Handlers
//!
//! Axum request handlers for the payment-link API.
//!
//! The webhook handler acknowledges every delivery it could classify
//! with 200 so the processor stops retrying; only an unknown outcome
//! (store or processor failure mid-reconcile) answers 503 to request a
//! retry.

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use cobro_core::{
    CobroError, Currency, IncomingNotification, LinkRequest, PaymentRecord, ReconcileOutcome,
};
use cobro_mercadopago::parse_notification;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

/// Upper bound on list page size
const MAX_LIST_LIMIT: usize = 100;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Create payment link request
#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    /// Amount in major units (100.0 means ARS 100)
    pub amount: f64,
    /// ISO currency code; defaults to ARS
    #[serde(default)]
    pub currency: Option<String>,
    /// Free-form description shown on the hosted checkout page
    #[serde(default)]
    pub description: Option<String>,
    /// Caller-supplied order id; generated when absent
    #[serde(default)]
    pub order_id: Option<String>,
}

/// Create payment link response
#[derive(Debug, Serialize)]
pub struct CreateLinkResponse {
    pub order_id: String,
    /// Redirect the payer here
    pub link_url: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preference_id: Option<String>,
}

/// Payment record projection returned by lookups
#[derive(Debug, Serialize)]
pub struct LinkView {
    pub order_id: String,
    pub status: String,
    /// Amount in major units
    pub amount: f64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub link_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preference_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl LinkView {
    fn from_record(record: PaymentRecord) -> Self {
        Self {
            status: record.status.as_str().to_string(),
            amount: record.amount_decimal(),
            currency: record.currency.to_string(),
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
            order_id: record.order_id,
            description: record.description,
            link_url: record.payment_link_url,
            external_payment_id: record.external_payment_id,
            preference_id: record.preference_id,
        }
    }
}

/// List query parameters
#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// Webhook acknowledgment body
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

fn error_to_response(err: CobroError) -> (StatusCode, Json<ErrorResponse>) {
    let code = err.status_code();
    let response = ErrorResponse::new(err.to_string(), code);
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(response),
    )
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(message, 400)),
    )
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "cobro",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Create a payment link
#[instrument(skip(state, request))]
pub async fn create_link(
    State(state): State<AppState>,
    Json(request): Json<CreateLinkRequest>,
) -> Result<Json<CreateLinkResponse>, (StatusCode, Json<ErrorResponse>)> {
    let currency = match request.currency.as_deref() {
        Some(code) => Currency::from_code(code)
            .ok_or_else(|| bad_request(format!("Unknown currency: {}", code)))?,
        None => Currency::default(),
    };

    if !request.amount.is_finite() || request.amount <= 0.0 {
        return Err(bad_request("Amount must be a positive number"));
    }

    let order_id = request
        .order_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(PaymentRecord::generate_order_id);
    let amount = currency.to_minor_units(request.amount);

    // refuse before calling the processor, so a duplicate does not burn a
    // link; the store's create keeps the race window closed
    match state.store.get(&order_id).await {
        Ok(_) => {
            return Err((
                StatusCode::CONFLICT,
                Json(ErrorResponse::new(
                    format!("Record already exists for order {}", order_id),
                    409,
                )),
            ))
        }
        Err(CobroError::NotFound { .. }) => {}
        Err(err) => return Err(error_to_response(err)),
    }

    info!(
        "Creating payment link: order={}, amount={} {}",
        order_id, request.amount, currency
    );

    let link_request = LinkRequest {
        order_id: order_id.clone(),
        amount,
        currency,
        description: request.description.clone(),
    };

    let issued = state
        .processor
        .create_link(&link_request)
        .await
        .map_err(|e| {
            error!("Failed to create payment link: {}", e);
            error_to_response(e)
        })?;

    let mut record = PaymentRecord::new(&order_id, amount, currency, &issued.link_url);
    if let Some(description) = request.description {
        record = record.with_description(description);
    }
    if let Some(preference_id) = issued.preference_id {
        record = record.with_preference_id(preference_id);
    }
    record.external_payment_id = issued.external_payment_id;

    // a create that loses the race here orphans the issued link
    state.store.create(record.clone()).await.map_err(|e| {
        error!("Failed to persist payment record: {}", e);
        error_to_response(e)
    })?;

    info!(
        "Created payment link: order={}, url={}",
        record.order_id, record.payment_link_url
    );

    Ok(Json(CreateLinkResponse {
        status: record.status.as_str().to_string(),
        order_id: record.order_id,
        link_url: record.payment_link_url,
        preference_id: record.preference_id,
    }))
}

/// Look up one payment record by order id
#[instrument(skip(state))]
pub async fn get_link(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<LinkView>, (StatusCode, Json<ErrorResponse>)> {
    let record = state.store.get(&order_id).await.map_err(error_to_response)?;
    Ok(Json(LinkView::from_record(record)))
}

/// List recent payment records, newest first
pub async fn list_links(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let limit = params.limit.min(MAX_LIST_LIMIT);
    let records = state.store.list(limit).await.map_err(error_to_response)?;
    let links: Vec<LinkView> = records.into_iter().map(LinkView::from_record).collect();

    Ok(Json(serde_json::json!({
        "links": links,
        "count": links.len()
    })))
}

/// Handle a payment processor webhook
#[instrument(skip(state, headers, body))]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, (StatusCode, Json<ErrorResponse>)> {
    let notification = match parse_notification(&body) {
        Ok(notification) => notification,
        Err(err) => {
            warn!("Acknowledging unusable webhook payload: {}", err);
            return Ok(Json(WebhookAck { received: true }));
        }
    };

    if let Err(err) = verify_signature(&state, &headers, &notification) {
        warn!("Acknowledging webhook with rejected signature: {}", err);
        return Ok(Json(WebhookAck { received: true }));
    }

    match state.reconciler.handle(notification).await {
        Ok(outcome) => {
            log_outcome(&outcome);
            Ok(Json(WebhookAck { received: true }))
        }
        Err(err) if err.is_retryable() => {
            error!("Webhook reconciliation failed: {}", err);
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(
                    ErrorResponse::new("Reconciliation unavailable, retry later", 503)
                        .with_details(err.to_string()),
                ),
            ))
        }
        // a redelivery would replay the same failure
        Err(err) => {
            warn!("Acknowledging webhook that cannot be reconciled: {}", err);
            Ok(Json(WebhookAck { received: true }))
        }
    }
}

/// Verify the `x-signature` header when a webhook secret is configured.
///
/// Only the standard payment-event shape carries the signed `data.id`
/// manifest. The flat shape is unsigned, so with a secret configured it
/// is not trusted.
fn verify_signature(
    state: &AppState,
    headers: &HeaderMap,
    notification: &IncomingNotification,
) -> Result<(), CobroError> {
    let Some(verifier) = &state.verifier else {
        return Ok(());
    };

    match notification {
        IncomingNotification::PaymentEvent { payment_id, .. } => {
            let signature = header_str(headers, "x-signature").ok_or_else(|| {
                CobroError::MalformedPayload("missing x-signature header".to_string())
            })?;
            let request_id = header_str(headers, "x-request-id").ok_or_else(|| {
                CobroError::MalformedPayload("missing x-request-id header".to_string())
            })?;
            verifier.verify(&signature, &request_id, payment_id)
        }
        // nothing will be processed anyway
        IncomingNotification::Ignored { .. } => Ok(()),
        IncomingNotification::StatusReport(_) => Err(CobroError::MalformedPayload(
            "unsigned status payload rejected".to_string(),
        )),
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(String::from)
}

fn log_outcome(outcome: &ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::Applied { previous, record } => info!(
            "Webhook applied: order={}, {} -> {}",
            record.order_id, previous, record.status
        ),
        ReconcileOutcome::Duplicate { order_id, event_id } => {
            info!("Webhook duplicate: order={}, event={}", order_id, event_id)
        }
        ReconcileOutcome::Conflicting {
            order_id,
            current,
            incoming,
        } => warn!(
            "Webhook conflict: order={}, record is {}, notification wants {}",
            order_id, current, incoming
        ),
        ReconcileOutcome::UnknownRecord { reference } => {
            warn!("Webhook for unknown record: {}", reference)
        }
        ReconcileOutcome::Ignored { kind } => info!("Webhook ignored: kind={}", kind),
    }
}
