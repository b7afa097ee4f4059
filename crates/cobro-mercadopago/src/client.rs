//! # Mercado Pago Client
//!
//! Implementation of the `PaymentProcessor` port against the Mercado Pago
//! REST API: preference creation (hosted payment links) and payment
//! lookup for webhook reconciliation.

use crate::config::MercadoPagoConfig;
use async_trait::async_trait;
use cobro_core::{
    CobroError, CobroResult, Currency, IssuedLink, LinkRequest, PaymentProcessor, PaymentStatus,
    ProcessorPayment,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

/// Default item title when the caller supplies no description
const DEFAULT_ITEM_TITLE: &str = "Payment Link";

/// Mercado Pago payment-link client
///
/// Uses Checkout Pro preferences: the payer is redirected to a hosted
/// page, and payment results arrive asynchronously via webhook.
pub struct MercadoPagoClient {
    config: MercadoPagoConfig,
    client: Client,
}

impl MercadoPagoClient {
    /// Create a new Mercado Pago client
    pub fn new(config: MercadoPagoConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    /// Create from environment variables
    pub fn from_env() -> CobroResult<Self> {
        let config = MercadoPagoConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Build the preference body for the Mercado Pago API
    fn build_preference(&self, request: &LinkRequest) -> PreferenceRequest {
        let title = request
            .description
            .clone()
            .unwrap_or_else(|| DEFAULT_ITEM_TITLE.to_string());

        PreferenceRequest {
            items: vec![PreferenceItem {
                title,
                quantity: 1,
                unit_price: request.currency.from_minor_units(request.amount),
                currency_id: request.currency.as_str().to_string(),
            }],
            external_reference: request.order_id.clone(),
            back_urls: PreferenceBackUrls {
                success: self.config.back_url_success.clone(),
                failure: self.config.back_url_failure.clone(),
                pending: self.config.back_url_pending.clone(),
            },
            auto_return: "approved".to_string(),
            metadata: PreferenceMetadata {
                order_id: request.order_id.clone(),
            },
        }
    }
}

#[async_trait]
impl PaymentProcessor for MercadoPagoClient {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_link(&self, request: &LinkRequest) -> CobroResult<IssuedLink> {
        if request.amount <= 0 {
            return Err(CobroError::InvalidRequest(
                "Amount must be positive".to_string(),
            ));
        }

        let preference = self.build_preference(request);

        debug!(
            "Creating Mercado Pago preference: amount={} {}",
            request.amount, request.currency
        );

        let url = format!("{}/checkout/preferences", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.config.auth_header())
            .json(&preference)
            .send()
            .await
            .map_err(|e| CobroError::UpstreamUnavailable {
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CobroError::UpstreamUnavailable {
                message: e.to_string(),
            })?;

        if !status.is_success() {
            error!("Mercado Pago API error: status={}, body={}", status, body);

            if let Ok(error_response) = serde_json::from_str::<MercadoPagoErrorResponse>(&body) {
                return Err(CobroError::UpstreamUnavailable {
                    message: error_response.message,
                });
            }

            return Err(CobroError::UpstreamUnavailable {
                message: format!("HTTP {}: {}", status, body),
            });
        }

        let preference_response: PreferenceResponse =
            serde_json::from_str(&body).map_err(|e| {
                CobroError::Serialization(format!(
                    "Failed to parse Mercado Pago response: {}",
                    e
                ))
            })?;

        let link_url = preference_response
            .init_point
            .filter(|url| !url.is_empty())
            .or(preference_response
                .sandbox_init_point
                .filter(|url| !url.is_empty()))
            .ok_or_else(|| {
                CobroError::Serialization(
                    "Preference response carries no init_point".to_string(),
                )
            })?;

        info!(
            "Created Mercado Pago preference: id={}, init_point={}",
            preference_response.id, link_url
        );

        Ok(IssuedLink {
            link_url,
            preference_id: Some(preference_response.id),
            // Mercado Pago assigns the payment id only once the payer
            // interacts with the link; it arrives via webhook.
            external_payment_id: None,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_payment(&self, payment_id: &str) -> CobroResult<ProcessorPayment> {
        debug!("Fetching payment {} from Mercado Pago", payment_id);

        let url = format!("{}/v1/payments/{}", self.config.api_base_url, payment_id);

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.config.auth_header())
            .send()
            .await
            .map_err(|e| CobroError::UpstreamUnavailable {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CobroError::NotFound {
                id: payment_id.to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| CobroError::UpstreamUnavailable {
                message: e.to_string(),
            })?;

        if !status.is_success() {
            error!("Mercado Pago API error: status={}, body={}", status, body);

            if let Ok(error_response) = serde_json::from_str::<MercadoPagoErrorResponse>(&body) {
                return Err(CobroError::UpstreamUnavailable {
                    message: error_response.message,
                });
            }

            return Err(CobroError::UpstreamUnavailable {
                message: format!("HTTP {}: {}", status, body),
            });
        }

        let payment: PaymentResponse = serde_json::from_str(&body).map_err(|e| {
            CobroError::Serialization(format!("Failed to parse payment response: {}", e))
        })?;

        // unknown processor codes fail closed
        let payment_status = PaymentStatus::from_code(&payment.status).ok_or_else(|| {
            CobroError::MalformedPayload(format!("unknown payment status: {}", payment.status))
        })?;

        let currency = match payment.currency_id.as_deref() {
            Some(code) => Some(Currency::from_code(code).ok_or_else(|| {
                CobroError::MalformedPayload(format!("unknown currency: {code}"))
            })?),
            None => None,
        };

        let amount = match (currency, payment.transaction_amount) {
            (Some(currency), Some(amount)) => Some(currency.to_minor_units(amount)),
            _ => None,
        };

        info!(
            "Fetched payment {}: status={}, reference={:?}",
            payment.id, payment_status, payment.external_reference
        );

        Ok(ProcessorPayment {
            payment_id: payment.id.to_string(),
            external_reference: payment.external_reference,
            status: payment_status,
            amount,
            currency,
        })
    }

    fn processor_name(&self) -> &'static str {
        "mercadopago"
    }
}

// =============================================================================
// Mercado Pago API Types
// =============================================================================

#[derive(Debug, Serialize)]
struct PreferenceRequest {
    items: Vec<PreferenceItem>,
    external_reference: String,
    back_urls: PreferenceBackUrls,
    auto_return: String,
    metadata: PreferenceMetadata,
}

#[derive(Debug, Serialize)]
struct PreferenceItem {
    title: String,
    quantity: i64,
    unit_price: f64,
    currency_id: String,
}

#[derive(Debug, Serialize)]
struct PreferenceBackUrls {
    success: String,
    failure: String,
    pending: String,
}

#[derive(Debug, Serialize)]
struct PreferenceMetadata {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    id: String,
    #[serde(default)]
    init_point: Option<String>,
    #[serde(default)]
    sandbox_init_point: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: i64,
    status: String,
    #[serde(default)]
    external_reference: Option<String>,
    #[serde(default)]
    transaction_amount: Option<f64>,
    #[serde(default)]
    currency_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MercadoPagoErrorResponse {
    message: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    status: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> MercadoPagoClient {
        MercadoPagoClient::new(
            MercadoPagoConfig::new("TEST-token").with_api_base_url(server.uri()),
        )
    }

    fn link_request() -> LinkRequest {
        LinkRequest {
            order_id: "A1".to_string(),
            amount: 10000,
            currency: Currency::ARS,
            description: Some("Order A1".to_string()),
        }
    }

    #[tokio::test]
    async fn create_link_returns_init_point() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/checkout/preferences"))
            .and(header("Authorization", "Bearer TEST-token"))
            .and(body_partial_json(json!({
                "external_reference": "A1",
                "auto_return": "approved",
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "123-abc",
                "init_point": "https://www.mercadopago.com/init/123",
                "sandbox_init_point": "https://sandbox.mercadopago.com/init/123",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let link = test_client(&server)
            .create_link(&link_request())
            .await
            .unwrap();

        assert_eq!(link.link_url, "https://www.mercadopago.com/init/123");
        assert_eq!(link.preference_id.as_deref(), Some("123-abc"));
        assert_eq!(link.external_payment_id, None);
    }

    #[tokio::test]
    async fn create_link_sends_decimal_unit_price() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/checkout/preferences"))
            .and(body_partial_json(json!({
                "items": [{
                    "title": "Order A1",
                    "quantity": 1,
                    "unit_price": 100.0,
                    "currency_id": "ARS",
                }],
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "123-abc",
                "init_point": "https://www.mercadopago.com/init/123",
            })))
            .expect(1)
            .mount(&server)
            .await;

        test_client(&server)
            .create_link(&link_request())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_link_falls_back_to_sandbox_init_point() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/checkout/preferences"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "123-abc",
                "sandbox_init_point": "https://sandbox.mercadopago.com/init/123",
            })))
            .mount(&server)
            .await;

        let link = test_client(&server)
            .create_link(&link_request())
            .await
            .unwrap();

        assert_eq!(link.link_url, "https://sandbox.mercadopago.com/init/123");
    }

    #[tokio::test]
    async fn create_link_rejects_non_positive_amount() {
        let server = MockServer::start().await;
        let mut request = link_request();
        request.amount = 0;

        let err = test_client(&server)
            .create_link(&request)
            .await
            .unwrap_err();

        assert!(matches!(err, CobroError::InvalidRequest(_)));
        assert_eq!(server.received_requests().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn create_link_surfaces_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/checkout/preferences"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "message": "invalid access token",
                "error": "bad_request",
                "status": 400,
            })))
            .mount(&server)
            .await;

        let err = test_client(&server)
            .create_link(&link_request())
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        match err {
            CobroError::UpstreamUnavailable { message } => {
                assert!(message.contains("invalid access token"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_payment_maps_fields_to_minor_units() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/payments/999"))
            .and(header("Authorization", "Bearer TEST-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 999,
                "status": "approved",
                "external_reference": "A1",
                "transaction_amount": 100.0,
                "currency_id": "ARS",
            })))
            .mount(&server)
            .await;

        let payment = test_client(&server).fetch_payment("999").await.unwrap();

        assert_eq!(payment.payment_id, "999");
        assert_eq!(payment.status, PaymentStatus::Approved);
        assert_eq!(payment.external_reference.as_deref(), Some("A1"));
        assert_eq!(payment.amount, Some(10000));
        assert_eq!(payment.currency, Some(Currency::ARS));
    }

    #[tokio::test]
    async fn fetch_payment_unknown_id_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/payments/404404"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "message": "Payment not found",
                "error": "not_found",
                "status": 404,
            })))
            .mount(&server)
            .await;

        let err = test_client(&server)
            .fetch_payment("404404")
            .await
            .unwrap_err();

        assert!(matches!(err, CobroError::NotFound { .. }));
    }

    #[tokio::test]
    async fn fetch_payment_unknown_status_fails_closed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/payments/999"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 999,
                "status": "charged_back",
                "external_reference": "A1",
            })))
            .mount(&server)
            .await;

        let err = test_client(&server).fetch_payment("999").await.unwrap_err();

        assert!(matches!(err, CobroError::MalformedPayload(_)));
    }
}
