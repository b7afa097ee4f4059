//! # cobro-api
//!
//! HTTP API layer for cobro-rs.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - REST endpoints for creating and inspecting payment links
//! - Webhook handler reconciling payment notifications
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/links` | Create payment link |
//! | GET | `/links` | List payment links |
//! | GET | `/links/{order_id}` | Get payment link |
//! | POST | `/webhooks/payment` | Payment webhook |

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppConfig, AppState};
