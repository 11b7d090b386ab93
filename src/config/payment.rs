//! Payment configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Stripe settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentConfig {
    pub stripe_api_key: String,

    pub stripe_webhook_secret: String,

    /// Price of the Pro plan
    pub stripe_price_id: String,

    /// Base URL checkout redirects back to
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,

    /// Accept webhooks without a `Stripe-Signature` header
    #[serde(default)]
    pub test_mode: bool,

    /// Override for the Stripe REST endpoint (stripe-mock, proxies)
    pub api_base_url: Option<String>,

    /// Reject events Stripe marks as test-mode
    #[serde(default)]
    pub require_livemode: bool,
}

impl PaymentConfig {
    pub fn is_test_key(&self) -> bool {
        self.stripe_api_key.starts_with("sk_test_")
    }

    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        if self.stripe_api_key.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__STRIPE_API_KEY"));
        }
        if self.stripe_webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__STRIPE_WEBHOOK_SECRET"));
        }
        if self.stripe_price_id.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__STRIPE_PRICE_ID"));
        }

        // Restricted keys (rk_) are valid secret keys too
        if !self.stripe_api_key.starts_with("sk_") && !self.stripe_api_key.starts_with("rk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !self.stripe_webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }

        if !self.frontend_url.starts_with("http://") && !self.frontend_url.starts_with("https://") {
            return Err(ValidationError::InvalidFrontendUrl);
        }

        if production && self.test_mode {
            return Err(ValidationError::TestModeInProduction);
        }

        Ok(())
    }
}

fn default_frontend_url() -> String {
    "http://localhost:3001".to_string()
}
