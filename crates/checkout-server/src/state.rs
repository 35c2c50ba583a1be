//! Application State

use std::sync::Arc;

use checkout_payments::{CheckoutConfig, IntentService, ProcessorClient, WebhookEngine};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup
    pub config: CheckoutConfig,

    /// Processor-facing client for the connected-account operations
    pub processor: Arc<ProcessorClient>,

    /// Order validation and payment-intent creation
    pub intents: Arc<IntentService>,

    /// Webhook reconciliation core
    pub webhooks: Arc<WebhookEngine>,
}
