//! checkout HTTP Server
//!
//! Axum front end for the checkout payment flow: public configuration,
//! payment-intent creation, the processor webhook receiver, and the
//! connected-account operations.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkout_payments::{
    CheckoutConfig, IntentService, LogNotifier, ProcessorClient, SignatureVerifier,
    SqliteTransactionStore, WebhookEngine,
};

use crate::handlers::{
    create_connected_account, create_intent, create_onboarding_link, create_transfer, get_config,
    health_check, method_not_allowed, processor_webhook,
};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = CheckoutConfig::from_env()?;
    tracing::info!(
        environment = config.environment.as_str(),
        "Configuration loaded"
    );

    // Durable transaction store
    let db_path =
        std::env::var("DATABASE_PATH").unwrap_or_else(|_| "data/transactions.db".into());
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store = Arc::new(SqliteTransactionStore::open(&db_path).await?);
    tracing::info!(path = %db_path, "Transaction store ready");

    // Payment components
    let processor = Arc::new(ProcessorClient::new(&config.secret_key));
    let intents = Arc::new(IntentService::new(processor.clone(), config.clone()));
    let webhooks = Arc::new(WebhookEngine::new(
        SignatureVerifier::new(config.webhook_secret.clone()),
        store,
        Arc::new(LogNotifier),
    ));

    let state = AppState {
        config,
        processor,
        intents,
        webhooks,
    };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router; wrong-method hits get an enveloped 405
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/config", get(get_config).fallback(method_not_allowed))
        .route(
            "/create-intent",
            post(create_intent).fallback(method_not_allowed),
        )
        .route(
            "/webhook",
            post(processor_webhook).fallback(method_not_allowed),
        )
        .route(
            "/connected-account",
            post(create_connected_account).fallback(method_not_allowed),
        )
        .route(
            "/onboarding-link",
            post(create_onboarding_link).fallback(method_not_allowed),
        )
        .route(
            "/transfer",
            post(create_transfer).fallback(method_not_allowed),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:4242".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("checkout server running on http://{}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health            - Health check");
    tracing::info!("  GET  /config            - Public payment configuration");
    tracing::info!("  POST /create-intent     - Create a payment intent");
    tracing::info!("  POST /webhook           - Processor webhook receiver");
    tracing::info!("  POST /connected-account - Create a connected account");
    tracing::info!("  POST /onboarding-link   - Create an onboarding link");
    tracing::info!("  POST /transfer          - Transfer funds to a connected account");

    axum::serve(listener, app).await?;

    Ok(())
}
