//! # cobro-mercadopago
//!
//! Mercado Pago adapter for cobro-rs.
//!
//! This crate binds the `PaymentProcessor` port to the Mercado Pago REST
//! API:
//!
//! - **MercadoPagoClient** - Checkout Pro preferences (hosted payment
//!   links) and payment lookup for reconciliation
//! - **parse_notification** - decodes webhook bodies into
//!   `IncomingNotification` values
//! - **SignatureVerifier** - validates `x-signature` headers on webhook
//!   deliveries
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cobro_mercadopago::MercadoPagoClient;
//! use cobro_core::{Currency, LinkRequest, PaymentProcessor};
//!
//! // Create client from environment (MP_ACCESS_TOKEN et al.)
//! let client = MercadoPagoClient::from_env()?;
//!
//! let link = client.create_link(&LinkRequest {
//!     order_id: "A1".to_string(),
//!     amount: 10000,
//!     currency: Currency::ARS,
//!     description: Some("Order A1".to_string()),
//! }).await?;
//!
//! // Send the payer to link.link_url
//! ```
//!
//! ## Webhook Handling
//!
//! ```rust,ignore
//! use cobro_mercadopago::{parse_notification, SignatureVerifier};
//!
//! // In your webhook endpoint:
//! let verifier = SignatureVerifier::new(webhook_secret);
//! verifier.verify(signature_header, request_id, data_id)?;
//!
//! let notification = parse_notification(&body)?;
//! let outcome = reconciler.handle(notification).await?;
//! ```

pub mod client;
pub mod config;
pub mod notification;

// Re-exports
pub use client::MercadoPagoClient;
pub use config::MercadoPagoConfig;
pub use notification::{parse_notification, SignatureVerifier};
