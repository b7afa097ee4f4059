//! # Routes
//!
//! Axum router configuration for the payment-link API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - POST /links - Create a payment link
/// - GET  /links - List recent payment links
/// - GET  /links/{order_id} - Look up one payment link
/// - POST /webhooks/payment - Processor webhook (raw body, no CORS needed)
/// - GET  /health - Health check
pub fn create_router(state: AppState) -> Router {
    // CORS configuration - allow all origins for now
    let cors = CorsLayer::new()
        .allow_origin(Any) // TODO: restrict to the storefront origin in production
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check at root
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        // Payment links
        .route(
            "/links",
            post(handlers::create_link).get(handlers::list_links),
        )
        .route("/links/{order_id}", get(handlers::get_link))
        // Webhooks
        .route("/webhooks/payment", post(handlers::payment_webhook))
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        // State
        .with_state(state)
}
