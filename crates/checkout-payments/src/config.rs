//! Environment Configuration
//!
//! Immutable process-wide configuration, constructed once at startup and
//! passed explicitly into the components that need it. Secrets live only
//! here and in the processor client; nothing in this module serializes them.

use serde::Serialize;

use crate::error::{PaymentError, Result};

/// Minimum chargeable amount in minor units (R$ 0,50).
pub const MIN_CHARGE_AMOUNT: i64 = 50;

/// Maximum chargeable amount in minor units (R$ 999.999,99).
pub const MAX_CHARGE_AMOUNT: i64 = 99_999_999;

/// The single currency this deployment charges in.
pub const CURRENCY: &str = "brl";

/// Deployment environment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    /// Anything that is not explicitly `production` counts as development.
    pub fn parse(s: &str) -> Self {
        match s {
            "production" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Process-wide checkout configuration
#[derive(Clone)]
pub struct CheckoutConfig {
    /// Processor secret API key
    pub secret_key: String,

    /// Processor publishable key, safe to hand to the browser
    pub publishable_key: String,

    /// Webhook signing secret
    pub webhook_secret: String,

    /// Base URL of this application, no trailing slash
    pub app_url: String,

    /// Deployment environment
    pub environment: Environment,
}

impl CheckoutConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;
        let publishable_key = std::env::var("STRIPE_PUBLISHABLE_KEY")
            .map_err(|_| PaymentError::Config("STRIPE_PUBLISHABLE_KEY not set".into()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| PaymentError::Config("STRIPE_WEBHOOK_SECRET not set".into()))?;
        let app_url =
            std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:4242".into());
        let environment =
            Environment::parse(&std::env::var("APP_ENV").unwrap_or_else(|_| "development".into()));

        Ok(Self {
            secret_key,
            publishable_key,
            webhook_secret,
            app_url: app_url.trim_end_matches('/').to_string(),
            environment,
        })
    }

    /// The non-secret subset exposed to the browser.
    ///
    /// The amount bounds here are the same constants intent validation
    /// enforces, so client and server can never disagree.
    pub fn public(&self) -> PublicConfig {
        PublicConfig {
            publishable_key: self.publishable_key.clone(),
            environment: self.environment.as_str(),
            currency: CURRENCY,
            min_amount: MIN_CHARGE_AMOUNT,
            max_amount: MAX_CHARGE_AMOUNT,
        }
    }

    /// Refresh URL for connected-account onboarding
    pub fn onboarding_refresh_url(&self) -> String {
        format!("{}/onboarding_refresh.html", self.app_url)
    }

    /// Return URL for connected-account onboarding
    pub fn onboarding_return_url(&self) -> String {
        format!("{}/onboarding_return.html", self.app_url)
    }
}

/// Safe-to-publish configuration returned by the config endpoint
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicConfig {
    pub publishable_key: String,
    pub environment: &'static str,
    pub currency: &'static str,
    pub min_amount: i64,
    pub max_amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CheckoutConfig {
        CheckoutConfig {
            secret_key: "sk_test_xxx".into(),
            publishable_key: "pk_test_xxx".into(),
            webhook_secret: "whsec_xxx".into(),
            app_url: "http://localhost:4242".into(),
            environment: Environment::Development,
        }
    }

    #[test]
    fn public_config_matches_validation_bounds() {
        let public = test_config().public();
        assert_eq!(public.min_amount, MIN_CHARGE_AMOUNT);
        assert_eq!(public.max_amount, MAX_CHARGE_AMOUNT);
        assert_eq!(public.currency, "brl");
    }

    #[test]
    fn public_config_never_carries_the_secret_key() {
        let json = serde_json::to_string(&test_config().public()).unwrap();
        assert!(!json.contains("sk_test_xxx"));
        assert!(!json.contains("whsec_xxx"));
        assert!(json.contains("pk_test_xxx"));
    }

    #[test]
    fn onboarding_urls_derive_from_base_url() {
        let config = test_config();
        assert_eq!(
            config.onboarding_refresh_url(),
            "http://localhost:4242/onboarding_refresh.html"
        );
        assert_eq!(
            config.onboarding_return_url(),
            "http://localhost:4242/onboarding_return.html"
        );
    }

    #[test]
    fn environment_parsing_defaults_to_development() {
        assert_eq!(Environment::parse("production"), Environment::Production);
        assert_eq!(Environment::parse("development"), Environment::Development);
        assert_eq!(Environment::parse("staging"), Environment::Development);
    }
}
