//! # Mercado Pago Configuration
//!
//! Configuration management for the Mercado Pago integration.
//! All secrets are loaded from environment variables.

use cobro_core::CobroError;
use std::env;

/// Mercado Pago API configuration
#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
    /// Access token (TEST-... or APP_USR-...)
    pub access_token: String,

    /// Webhook signing secret; signature checks are skipped when unset
    pub webhook_secret: Option<String>,

    /// API base URL (for testing/mocking)
    pub api_base_url: String,

    /// Redirect for completed payments
    pub back_url_success: String,

    /// Redirect for failed payments
    pub back_url_failure: String,

    /// Redirect for payments still pending
    pub back_url_pending: String,
}

impl MercadoPagoConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `MP_ACCESS_TOKEN`
    ///
    /// Optional env vars:
    /// - `MP_WEBHOOK_SECRET`
    /// - `MP_API_BASE_URL`
    /// - `MP_BACK_URL_SUCCESS` / `MP_BACK_URL_FAILURE` / `MP_BACK_URL_PENDING`
    pub fn from_env() -> Result<Self, CobroError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let access_token = env::var("MP_ACCESS_TOKEN")
            .map_err(|_| CobroError::Configuration("MP_ACCESS_TOKEN not set".to_string()))?;

        // Validate token format
        if !access_token.starts_with("TEST-") && !access_token.starts_with("APP_USR-") {
            return Err(CobroError::Configuration(
                "MP_ACCESS_TOKEN must start with TEST- or APP_USR-".to_string(),
            ));
        }

        let webhook_secret = env::var("MP_WEBHOOK_SECRET").ok().filter(|s| !s.is_empty());

        let api_base_url = env::var("MP_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.mercadopago.com".to_string());

        Ok(Self {
            access_token,
            webhook_secret,
            api_base_url,
            back_url_success: env::var("MP_BACK_URL_SUCCESS")
                .unwrap_or_else(|_| "https://example.com/success".to_string()),
            back_url_failure: env::var("MP_BACK_URL_FAILURE")
                .unwrap_or_else(|_| "https://example.com/failure".to_string()),
            back_url_pending: env::var("MP_BACK_URL_PENDING")
                .unwrap_or_else(|_| "https://example.com/pending".to_string()),
        })
    }

    /// Create config with explicit values (for testing)
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            webhook_secret: None,
            api_base_url: "https://api.mercadopago.com".to_string(),
            back_url_success: "https://example.com/success".to_string(),
            back_url_failure: "https://example.com/failure".to_string(),
            back_url_pending: "https://example.com/pending".to_string(),
        }
    }

    /// Check if using a test token
    pub fn is_test_mode(&self) -> bool {
        self.access_token.starts_with("TEST-")
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Builder: set the webhook signing secret
    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }
}
