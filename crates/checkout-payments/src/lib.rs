//! # checkout-payments
//!
//! Core payment domain for the checkout service: the processor client
//! adapter, order validation and payment-intent creation, webhook signature
//! verification, and the webhook reconciliation engine with its durable
//! transaction store.
//!
//! End to end, the money path looks like this:
//!
//! ```text
//! ┌─────────┐      ┌───────────────┐      ┌─────────────────┐
//! │ Browser │─────▶│ IntentService │─────▶│ ProcessorClient │──▶ Stripe
//! └─────────┘      └───────────────┘      └─────────────────┘
//!                                                                 │
//!                        async, signed, at-least-once deliveries  │
//!                                                                 ▼
//! ┌──────────────────┐      ┌───────────────┐      ┌───────────────┐
//! │ TransactionStore │◀─────│ WebhookEngine │◀─────│   /webhook    │
//! └──────────────────┘      └───────┬───────┘      └───────────────┘
//!                                   ▼
//!                              Notifier (once per transition)
//! ```
//!
//! The engine is where the design weight sits: webhook deliveries are
//! at-least-once and unordered, so reconciliation is idempotent per
//! `(id, status)`, terminal statuses never regress, and notifications are
//! gated on the atomically-reported store outcome rather than on the event
//! itself.

mod config;
mod error;
mod event;
mod intent;
mod money;
mod processor;
mod signature;
mod sqlite;
mod transaction;
mod webhook;

pub use config::{
    CheckoutConfig, Environment, PublicConfig, CURRENCY, MAX_CHARGE_AMOUNT, MIN_CHARGE_AMOUNT,
};
pub use error::{PaymentError, Result};
pub use event::{DisputeObject, EventData, EventKind, PaymentObject, WebhookEvent};
pub use intent::{
    calculate_order_amount, idempotency_key, CreatedOrderIntent, IntentService, OrderItem,
    OrderRequest,
};
pub use money::{format_brl, major_to_minor_units};
pub use processor::{CreatedIntent, ProcessorClient, TransferRecord};
pub use signature::SignatureVerifier;
pub use sqlite::SqliteTransactionStore;
pub use transaction::{
    MemoryTransactionStore, TransactionRecord, TransactionStatus, TransactionStore, UpsertOutcome,
};
pub use webhook::{Disposition, LogNotifier, Notifier, WebhookEngine};
