//! HTTP Handlers
//!
//! Every endpoint answers with the same envelope -- a success flag, the data
//! or error payload, and a timestamp -- so one client-side handler can
//! process all of them. Request bodies are read as raw bytes and decoded
//! explicitly: the webhook endpoint needs the untouched bytes for signature
//! verification, and the others get enveloped JSON errors instead of the
//! framework's plain-text rejections.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use checkout_payments::{major_to_minor_units, OrderRequest, PaymentError, PublicConfig};

use crate::state::AppState;

// ============================================================================
// Response envelope
// ============================================================================

/// Uniform response envelope
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

fn success<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data: Some(data),
        error: None,
        timestamp: Utc::now().to_rfc3339(),
    })
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ApiResponse::<()> {
        success: false,
        data: None,
        error: Some(message.into()),
        timestamp: Utc::now().to_rfc3339(),
    };
    (status, Json(body)).into_response()
}

/// Map a domain error onto the envelope, keeping internal detail out of the
/// response body
fn error_response(err: &PaymentError) -> Response {
    if err.is_client_error() {
        failure(StatusCode::BAD_REQUEST, err.user_message())
    } else if err.is_retryable() {
        failure(StatusCode::SERVICE_UNAVAILABLE, err.user_message())
    } else {
        tracing::error!(error = %err, "Internal error");
        failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

/// Connected-account operations pass processor errors through verbatim
fn passthrough_error(err: &PaymentError) -> Response {
    match err {
        PaymentError::Processor { message, .. } => {
            failure(StatusCode::BAD_REQUEST, message.clone())
        }
        other => error_response(other),
    }
}

fn decode<T: for<'de> Deserialize<'de>>(body: &Bytes) -> Result<T, Response> {
    if body.is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "Empty request body"));
    }
    serde_json::from_slice(body)
        .map_err(|err| failure(StatusCode::BAD_REQUEST, format!("Invalid JSON: {err}")))
}

/// Envelope-shaped 405 for routes hit with the wrong method
pub async fn method_not_allowed() -> Response {
    failure(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

// ============================================================================
// Request/response types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedAccountRequest {
    pub email: Option<String>,
    pub external_party_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingLinkRequest {
    pub account_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub account_id: Option<String>,
    /// Amount in major currency units, e.g. 100.50
    pub amount_major_units: Option<f64>,
    pub order_ref: Option<String>,
    pub idempotency_key: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Safe public configuration for the payment form
pub async fn get_config(State(state): State<AppState>) -> Json<ApiResponse<PublicConfig>> {
    success(state.config.public())
}

/// Create a payment intent for an order
pub async fn create_intent(State(state): State<AppState>, body: Bytes) -> Response {
    let payload: OrderRequest = match decode(&body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };

    match state.intents.create_intent(payload).await {
        Ok(created) => success(created).into_response(),
        Err(err) => error_response(&err),
    }
}

/// Processor webhook receiver.
///
/// The raw body goes to the engine untouched; decoding it first would break
/// signature verification.
pub async fn processor_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok());

    match state.webhooks.process(&body, signature).await {
        Ok(_) => (StatusCode::OK, Json(json!({"status": "success"}))).into_response(),
        Err(err @ PaymentError::MissingSignature) => {
            tracing::warn!("Webhook rejected: missing signature header");
            failure(StatusCode::BAD_REQUEST, err.user_message())
        }
        Err(err @ PaymentError::InvalidPayload(_)) => {
            tracing::warn!(error = %err, "Webhook rejected: invalid payload");
            failure(StatusCode::BAD_REQUEST, err.user_message())
        }
        Err(err @ PaymentError::InvalidSignature(_)) => {
            tracing::warn!(error = %err, "Webhook rejected: invalid signature");
            failure(StatusCode::BAD_REQUEST, err.user_message())
        }
        Err(err) => {
            tracing::error!(error = %err, "Webhook processing failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// Create an express connected account
pub async fn create_connected_account(State(state): State<AppState>, body: Bytes) -> Response {
    let payload: ConnectedAccountRequest = match decode(&body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };

    let (Some(email), Some(external_party_id)) = (payload.email, payload.external_party_id)
    else {
        return failure(
            StatusCode::BAD_REQUEST,
            "email and externalPartyId are required",
        );
    };

    match state
        .processor
        .create_connected_account(&email, &external_party_id)
        .await
    {
        Ok(account_id) => Json(json!({"success": true, "accountId": account_id})).into_response(),
        Err(err) => passthrough_error(&err),
    }
}

/// Create an onboarding link for an existing connected account
pub async fn create_onboarding_link(State(state): State<AppState>, body: Bytes) -> Response {
    let payload: OnboardingLinkRequest = match decode(&body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };

    let Some(account_id) = payload.account_id else {
        return failure(StatusCode::BAD_REQUEST, "accountId is required");
    };

    match state
        .processor
        .create_onboarding_link(
            &account_id,
            &state.config.onboarding_refresh_url(),
            &state.config.onboarding_return_url(),
        )
        .await
    {
        Ok(url) => Json(json!({"success": true, "onboardingUrl": url})).into_response(),
        Err(err) => passthrough_error(&err),
    }
}

/// Transfer funds to a connected account
pub async fn create_transfer(State(state): State<AppState>, body: Bytes) -> Response {
    let payload: TransferRequest = match decode(&body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };

    let (Some(account_id), Some(amount_major)) = (payload.account_id, payload.amount_major_units)
    else {
        return failure(
            StatusCode::BAD_REQUEST,
            "accountId and amountMajorUnits are required",
        );
    };

    let amount_minor = major_to_minor_units(amount_major);
    if amount_minor <= 0 {
        return failure(StatusCode::BAD_REQUEST, "amountMajorUnits must be positive");
    }

    match state
        .processor
        .create_transfer(
            &account_id,
            amount_minor,
            payload.order_ref.as_deref(),
            payload.idempotency_key.as_deref(),
        )
        .await
    {
        Ok(transfer) => Json(json!({"success": true, "transfer": transfer})).into_response(),
        Err(err) => passthrough_error(&err),
    }
}
