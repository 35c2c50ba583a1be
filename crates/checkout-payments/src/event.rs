//! Webhook Event Model
//!
//! Typed envelope for processor webhook events plus extraction of the
//! normalized object subsets the reconciliation engine consumes. Only the
//! fields the engine actually uses are pulled out; everything else in the
//! embedded object is ignored.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PaymentError, Result};

/// Event types the reconciliation engine recognizes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// `payment_intent.succeeded`
    PaymentSucceeded,
    /// `payment_intent.payment_failed`
    PaymentFailed,
    /// `payment_intent.canceled`
    PaymentCanceled,
    /// `payment_intent.requires_action`
    PaymentRequiresAction,
    /// `charge.dispute.created`
    DisputeCreated,
    /// Anything else; acknowledged without processing
    Unknown,
}

impl EventKind {
    /// Classify a raw event type string. Unrecognized types are never an
    /// error -- the processor adds event types over time.
    pub fn classify(event_type: &str) -> Self {
        match event_type {
            "payment_intent.succeeded" => EventKind::PaymentSucceeded,
            "payment_intent.payment_failed" => EventKind::PaymentFailed,
            "payment_intent.canceled" => EventKind::PaymentCanceled,
            "payment_intent.requires_action" => EventKind::PaymentRequiresAction,
            "charge.dispute.created" => EventKind::DisputeCreated,
            _ => EventKind::Unknown,
        }
    }
}

/// Raw event envelope as delivered by the processor
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WebhookEvent {
    /// Event identifier (`evt_...`)
    pub id: String,

    /// Raw event type string
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event creation time at the processor (unix seconds)
    #[serde(default)]
    pub created: i64,

    /// Whether this is a live mode event
    #[serde(default)]
    pub livemode: bool,

    /// Container for the embedded object
    pub data: EventData,
}

/// Event data container
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventData {
    /// The embedded object (payment intent, dispute, ...), left untyped
    /// until the event is classified
    pub object: Value,
}

impl WebhookEvent {
    /// Parse from the raw (already signature-verified) body
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| PaymentError::InvalidPayload(e.to_string()))
    }

    pub fn kind(&self) -> EventKind {
        EventKind::classify(&self.event_type)
    }

    /// Extract the normalized payment-intent subset for `payment_intent.*`
    /// events. A missing required field is a payload-shape problem, not a
    /// delivery problem: callers log it and acknowledge rather than failing
    /// the request.
    pub fn payment_object(&self) -> Result<PaymentObject> {
        let obj = &self.data.object;

        let id = require_str(obj, "id")?;
        let amount = require_i64(obj, "amount")?;
        let currency = require_str(obj, "currency")?;
        let created = require_i64(obj, "created")?;

        let payment_method = obj
            .get("payment_method")
            .and_then(Value::as_str)
            .map(String::from);
        let metadata = obj
            .get("metadata")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let failure_message = obj
            .pointer("/last_payment_error/message")
            .and_then(Value::as_str)
            .map(String::from);
        let next_action = obj
            .pointer("/next_action/type")
            .and_then(Value::as_str)
            .map(String::from);

        Ok(PaymentObject {
            id: id.to_string(),
            amount,
            currency: currency.to_string(),
            created,
            payment_method,
            metadata,
            failure_message,
            next_action,
        })
    }

    /// Extract the dispute subset for `charge.dispute.created`
    pub fn dispute_object(&self) -> Result<DisputeObject> {
        let obj = &self.data.object;

        Ok(DisputeObject {
            id: require_str(obj, "id")?.to_string(),
            charge: require_str(obj, "charge")?.to_string(),
            amount: obj.get("amount").and_then(Value::as_i64).unwrap_or(0),
            reason: obj.get("reason").and_then(Value::as_str).map(String::from),
        })
    }
}

fn require_str<'a>(obj: &'a Value, field: &str) -> Result<&'a str> {
    obj.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| PaymentError::InvalidPayload(format!("object missing {field}")))
}

fn require_i64(obj: &Value, field: &str) -> Result<i64> {
    obj.get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| PaymentError::InvalidPayload(format!("object missing {field}")))
}

/// Normalized payment-intent subset
#[derive(Clone, Debug)]
pub struct PaymentObject {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub created: i64,
    pub payment_method: Option<String>,
    pub metadata: HashMap<String, String>,
    /// Message from `last_payment_error`, when present
    pub failure_message: Option<String>,
    /// `next_action.type`, when the payment needs e.g. 3-D Secure
    pub next_action: Option<String>,
}

/// Normalized dispute subset, used for logging only
#[derive(Clone, Debug)]
pub struct DisputeObject {
    pub id: String,
    pub charge: String,
    pub amount: i64,
    pub reason: Option<String>,
}
