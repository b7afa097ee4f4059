//! # Application State
//!
//! Shared state for the Axum application.
//! Contains the record store, the payment processor, the webhook
//! reconciler and configuration.

use cobro_core::{MemoryRecordStore, SharedProcessor, SharedRecordStore, WebhookReconciler};
use cobro_mercadopago::{MercadoPagoClient, MercadoPagoConfig, SignatureVerifier};
use std::sync::Arc;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Base URL for callbacks
    pub base_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Invalid socket address")
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Payment record store
    pub store: SharedRecordStore,
    /// Payment processor issuing links
    pub processor: SharedProcessor,
    /// Webhook reconciler
    pub reconciler: Arc<WebhookReconciler>,
    /// Webhook signature verifier; `None` when no secret is configured
    pub verifier: Option<SignatureVerifier>,
    /// Application config
    pub config: AppConfig,
}

impl AppState {
    /// Create state from the environment: the in-memory record store in
    /// front of the Mercado Pago client.
    pub fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env();

        let mp_config = MercadoPagoConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to initialize Mercado Pago: {}", e))?;
        let verifier = mp_config.webhook_secret.clone().map(SignatureVerifier::new);

        let store: SharedRecordStore = Arc::new(MemoryRecordStore::new());
        let processor: SharedProcessor = Arc::new(MercadoPagoClient::new(mp_config));

        Ok(Self::with_parts(store, processor, verifier, config))
    }

    /// Assemble state from explicit parts. Tests inject stub processors
    /// and verifiers through this.
    pub fn with_parts(
        store: SharedRecordStore,
        processor: SharedProcessor,
        verifier: Option<SignatureVerifier>,
        config: AppConfig,
    ) -> Self {
        let reconciler = Arc::new(WebhookReconciler::new(store.clone(), processor.clone()));

        Self {
            store,
            processor,
            reconciler,
            verifier,
            config,
        }
    }
}
