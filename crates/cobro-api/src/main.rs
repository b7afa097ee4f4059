//! # Cobro RS
//!
//! Payment-link service backed by Mercado Pago.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export MP_ACCESS_TOKEN=TEST-...
//! export MP_WEBHOOK_SECRET=...    # optional, enables signature checks
//!
//! # Run the server
//! cobro
//! ```

use cobro_api::{routes, state::AppState};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Print banner
    print_banner();

    // Initialize application state
    let state = AppState::new()?;

    let addr = state.config.socket_addr();
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!("Payment processor: {}", state.processor.processor_name());
    info!(
        "Webhook signatures: {}",
        if state.verifier.is_some() {
            "enforced"
        } else {
            "disabled"
        }
    );

    // Create router
    let app = routes::create_router(state);

    // Start server
    info!("🚀 Cobro starting on http://{}", addr);

    if !is_prod {
        info!("💳 Create link: POST http://{}/links", addr);
        info!("🔔 Webhook: POST http://{}/webhooks/payment", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  💸 Cobro RS 💸
  ━━━━━━━━━━━━━━━━━━━━━━━
  Payment links, reconciled
  Version: {}

"#,
        env!("CARGO_PKG_VERSION")
    );
}
