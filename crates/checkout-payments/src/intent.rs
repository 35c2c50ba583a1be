//! Intent Creation Service
//!
//! Validates an order request, computes the charge amount server-side, and
//! asks the processor for a payment intent under a per-order, per-day
//! idempotency key. Client-supplied totals are never trusted beyond bounds
//! checking.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{CheckoutConfig, CURRENCY, MAX_CHARGE_AMOUNT, MIN_CHARGE_AMOUNT};
use crate::error::{PaymentError, Result};
use crate::processor::ProcessorClient;

const MAX_ORDER_ID_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 254;

/// One order line; only the charge amount matters here
#[derive(Clone, Debug, Deserialize)]
pub struct OrderItem {
    pub amount: i64,
}

/// Incoming order payload. Lives only for the duration of intent creation.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderRequest {
    pub items: Vec<OrderItem>,
    pub order_id: Option<String>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
}

/// Outcome returned to the browser so it can confirm the payment
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrderIntent {
    pub client_secret: String,
    pub intent_id: String,
    pub amount: i64,
    pub currency: &'static str,
}

/// Sum the item amounts that are individually chargeable. Non-conforming
/// items (zero, negative, or above the per-item ceiling) are excluded from
/// the sum, never rejected as a whole request.
pub fn calculate_order_amount(items: &[OrderItem]) -> i64 {
    items
        .iter()
        .map(|item| item.amount)
        .filter(|amount| *amount > 0 && *amount <= MAX_CHARGE_AMOUNT)
        .sum()
}

/// Derive the idempotency key for intent creation. Resubmitting the same
/// order on the same UTC day reuses the key; a new day produces a new one.
pub fn idempotency_key(order_id: &str, date: NaiveDate) -> String {
    format!("{}:create_pi:{}", order_id, date.format("%Y-%m-%d"))
}

/// Syntactic email check: single `@`, non-empty local part, dotted domain,
/// no whitespace
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && !tld.is_empty()
}

fn validate(request: &OrderRequest) -> Result<i64> {
    let mut errors: Vec<String> = Vec::new();

    if request.items.is_empty() {
        errors.push("items are required and must be a non-empty list".into());
    }

    let amount = calculate_order_amount(&request.items);
    if amount < MIN_CHARGE_AMOUNT {
        errors.push(format!(
            "minimum amount is {MIN_CHARGE_AMOUNT} centavos (R$ 0,50)"
        ));
    }
    if amount > MAX_CHARGE_AMOUNT {
        errors.push(format!(
            "maximum amount is {MAX_CHARGE_AMOUNT} centavos (R$ 999.999,99)"
        ));
    }

    if let Some(order_id) = &request.order_id {
        if order_id.len() > MAX_ORDER_ID_LEN {
            errors.push(format!(
                "orderId must be at most {MAX_ORDER_ID_LEN} characters"
            ));
        }
    }

    if let Some(email) = &request.customer_email {
        if !is_valid_email(email) {
            errors.push("customerEmail is not a valid email address".into());
        }
        if email.len() > MAX_EMAIL_LEN {
            errors.push("customerEmail is too long".into());
        }
    }

    if errors.is_empty() {
        Ok(amount)
    } else {
        Err(PaymentError::Validation(errors.join("; ")))
    }
}

/// Order validation plus intent creation against the processor
pub struct IntentService {
    processor: Arc<ProcessorClient>,
    config: CheckoutConfig,
}

impl IntentService {
    pub fn new(processor: Arc<ProcessorClient>, config: CheckoutConfig) -> Self {
        Self { processor, config }
    }

    pub async fn create_intent(&self, request: OrderRequest) -> Result<CreatedOrderIntent> {
        let request_id = Uuid::new_v4();

        let amount = match validate(&request) {
            Ok(amount) => amount,
            Err(err) => {
                tracing::warn!(request_id = %request_id, error = %err, "Order validation failed");
                return Err(err);
            }
        };

        let order_id = request
            .order_id
            .clone()
            .unwrap_or_else(|| format!("order_{}", Uuid::new_v4().simple()));

        let mut metadata = HashMap::from([
            ("order_id".to_string(), order_id.clone()),
            ("created_via".to_string(), "checkout_form".to_string()),
            (
                "environment".to_string(),
                self.config.environment.as_str().to_string(),
            ),
        ]);
        if let Some(email) = &request.customer_email {
            metadata.insert("customer_email".to_string(), email.clone());
        }
        if let Some(name) = &request.customer_name {
            metadata.insert("customer_name".to_string(), name.clone());
        }

        let key = idempotency_key(&order_id, Utc::now().date_naive());

        tracing::info!(
            request_id = %request_id,
            order_id = %order_id,
            amount,
            currency = CURRENCY,
            "Creating payment intent"
        );

        let intent = match self
            .processor
            .create_payment_intent(amount, metadata, request.customer_email.as_deref(), &key)
            .await
        {
            Ok(intent) => intent,
            Err(err) => {
                tracing::error!(
                    request_id = %request_id,
                    order_id = %order_id,
                    error = %err,
                    "Payment intent creation failed"
                );
                return Err(err);
            }
        };

        tracing::info!(
            request_id = %request_id,
            payment_intent_id = %intent.intent_id,
            order_id = %order_id,
            amount,
            "Payment intent created"
        );

        Ok(CreatedOrderIntent {
            client_secret: intent.client_secret,
            intent_id: intent.intent_id,
            amount,
            currency: CURRENCY,
        })
    }
}
