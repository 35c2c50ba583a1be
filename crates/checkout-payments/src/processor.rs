//! Processor Client Adapter
//!
//! Thin authenticated wrapper over the Stripe API. Pure request/response --
//! no business logic or local state lives here, and every failure surfaces
//! the processor's type/code/message triple through [`PaymentError`].

use std::collections::HashMap;

use serde::Serialize;
use stripe::{
    Account, AccountId, AccountLink, AccountLinkType, AccountType, Client, CreateAccount,
    CreateAccountCapabilities, CreateAccountCapabilitiesTransfers, CreateAccountLink,
    CreatePaymentIntent, CreateTransfer, Currency, PaymentIntent, RequestStrategy, Transfer,
};

use crate::error::{PaymentError, Result};

/// Wrapper around the Stripe client
pub struct ProcessorClient {
    client: Client,
}

impl ProcessorClient {
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
        }
    }

    /// Create a payment intent for a card charge in the fixed currency.
    ///
    /// The idempotency key makes resubmission of the same order safe: the
    /// processor returns the original intent instead of charging twice.
    pub async fn create_payment_intent(
        &self,
        amount: i64,
        metadata: HashMap<String, String>,
        receipt_email: Option<&str>,
        idempotency_key: &str,
    ) -> Result<CreatedIntent> {
        let mut params = CreatePaymentIntent::new(amount, Currency::BRL);
        params.payment_method_types = Some(vec!["card".to_string()]);
        params.metadata = Some(metadata);
        params.receipt_email = receipt_email;

        let client = self
            .client
            .clone()
            .with_strategy(RequestStrategy::Idempotent(idempotency_key.to_string()));

        let intent = PaymentIntent::create(&client, params)
            .await
            .map_err(map_stripe_error)?;

        let client_secret = intent.client_secret.ok_or_else(|| PaymentError::Processor {
            error_type: "api_error".into(),
            code: None,
            message: "payment intent returned no client secret".into(),
        })?;

        Ok(CreatedIntent {
            intent_id: intent.id.to_string(),
            client_secret,
        })
    }

    /// Create an express connected account in Brazil, requesting only the
    /// transfers capability
    pub async fn create_connected_account(
        &self,
        email: &str,
        external_party_id: &str,
    ) -> Result<String> {
        let mut params = CreateAccount::new();
        params.type_ = Some(AccountType::Express);
        params.country = Some("BR");
        params.email = Some(email);
        params.capabilities = Some(CreateAccountCapabilities {
            transfers: Some(CreateAccountCapabilitiesTransfers {
                requested: Some(true),
            }),
            ..Default::default()
        });
        params.metadata = Some(HashMap::from([(
            "external_party_id".to_string(),
            external_party_id.to_string(),
        )]));

        let account = Account::create(&self.client, params)
            .await
            .map_err(map_stripe_error)?;

        Ok(account.id.to_string())
    }

    /// Create a time-limited onboarding link for an existing connected
    /// account
    pub async fn create_onboarding_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<String> {
        let account: AccountId = account_id.parse().map_err(|_| {
            PaymentError::Validation(format!("invalid account id: {account_id}"))
        })?;

        let mut params = CreateAccountLink::new(account, AccountLinkType::AccountOnboarding);
        params.refresh_url = Some(refresh_url);
        params.return_url = Some(return_url);

        let link = AccountLink::create(&self.client, params)
            .await
            .map_err(map_stripe_error)?;

        Ok(link.url)
    }

    /// Transfer funds to a connected account
    pub async fn create_transfer(
        &self,
        account_id: &str,
        amount_minor_units: i64,
        transfer_group: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> Result<TransferRecord> {
        let mut params = CreateTransfer::new(Currency::BRL, account_id.to_string());
        params.amount = Some(amount_minor_units);
        params.transfer_group = transfer_group;
        params.metadata = Some(HashMap::from([(
            "source".to_string(),
            "checkout_service".to_string(),
        )]));

        let client = match idempotency_key {
            Some(key) => self
                .client
                .clone()
                .with_strategy(RequestStrategy::Idempotent(key.to_string())),
            None => self.client.clone(),
        };

        let transfer = Transfer::create(&client, params)
            .await
            .map_err(map_stripe_error)?;

        Ok(TransferRecord {
            id: transfer.id.to_string(),
            amount: transfer.amount,
            currency: transfer.currency.to_string(),
            destination: account_id.to_string(),
            transfer_group: transfer.transfer_group.clone(),
            created: transfer.created,
        })
    }
}

/// Result of creating a payment intent
#[derive(Clone, Debug)]
pub struct CreatedIntent {
    pub intent_id: String,
    pub client_secret: String,
}

/// Normalized transfer result passed back to the caller
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub destination: String,
    pub transfer_group: Option<String>,
    pub created: i64,
}

/// Translate an SDK failure into the local error taxonomy, preserving the
/// processor's type/code/message triple.
///
/// The SDK folds authentication and rate-limit rejections into the generic
/// error type, so those two are recovered from the HTTP status instead.
fn map_stripe_error(err: stripe::StripeError) -> PaymentError {
    match err {
        stripe::StripeError::Stripe(request_error) => {
            let error_type = match request_error.http_status {
                401 => "authentication_error".to_string(),
                429 => "rate_limit_error".to_string(),
                _ => match request_error.error_type {
                    stripe::ErrorType::Card => "card_error".to_string(),
                    stripe::ErrorType::InvalidRequest => "invalid_request_error".to_string(),
                    stripe::ErrorType::Api => "api_error".to_string(),
                    other => format!("{other:?}").to_lowercase(),
                },
            };

            PaymentError::Processor {
                error_type,
                code: request_error.code.map(|code| code.to_string()),
                message: request_error
                    .message
                    .unwrap_or_else(|| "unknown processor error".into()),
            }
        }
        stripe::StripeError::Timeout => {
            PaymentError::ProcessorUnavailable("request to the processor timed out".into())
        }
        other => PaymentError::ProcessorUnavailable(other.to_string()),
    }
}
