//! CreateCheckoutSessionHandler - Command handler for starting a Pro checkout.

use std::sync::Arc;

use crate::domain::foundation::UserId;
use crate::domain::subscription::{SubscriptionError, SubscriptionUpdate, UserSubscription};
use crate::ports::{
    BillingGateway, CreateCheckoutRequest, CreateCustomerRequest, UserSubscriptionRepository,
};

/// Default frontend origin used to build checkout redirect URLs.
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3001";

/// Checkout parameters that come from configuration.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Price charged for the Pro tier.
    pub price_id: String,
    /// Frontend origin, without a trailing slash.
    pub frontend_url: String,
}

impl CheckoutSettings {
    pub fn new(price_id: impl Into<String>, frontend_url: impl Into<String>) -> Self {
        Self {
            price_id: price_id.into(),
            frontend_url: frontend_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn success_url(&self) -> String {
        format!("{}/pro/subscribe?status=success", self.frontend_url)
    }

    pub fn cancel_url(&self) -> String {
        format!("{}/pro/subscribe?status=cancel", self.frontend_url)
    }
}

/// Command to create a checkout session.
#[derive(Debug, Clone)]
pub struct CreateCheckoutSessionCommand {
    pub user_id: UserId,
}

/// Result of checkout creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCheckoutSessionResult {
    /// Hosted checkout page the client should redirect to.
    pub url: String,
}

/// Handler for creating checkout sessions.
pub struct CreateCheckoutSessionHandler {
    users: Arc<dyn UserSubscriptionRepository>,
    gateway: Arc<dyn BillingGateway>,
    settings: CheckoutSettings,
}

impl CreateCheckoutSessionHandler {
    pub fn new(
        users: Arc<dyn UserSubscriptionRepository>,
        gateway: Arc<dyn BillingGateway>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            users,
            gateway,
            settings,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreateCheckoutSessionCommand,
    ) -> Result<CreateCheckoutSessionResult, SubscriptionError> {
        // 1. Load the user
        let user = self
            .users
            .find_by_user_id(&cmd.user_id)
            .await?
            .ok_or_else(|| SubscriptionError::user_not_found(cmd.user_id.clone()))?;

        // 2. Refuse a second subscription
        if user.has_active_pro() {
            return Err(SubscriptionError::already_subscribed(cmd.user_id));
        }

        // 3. Ensure a billing customer exists
        let customer_id = self.ensure_customer(&user).await?;

        // 4. Create the hosted checkout
        let session = self
            .gateway
            .create_checkout_session(CreateCheckoutRequest {
                customer_id,
                price_id: self.settings.price_id.clone(),
                success_url: self.settings.success_url(),
                cancel_url: self.settings.cancel_url(),
            })
            .await?;

        tracing::info!(user_id = %user.user_id, session_id = %session.id, "Checkout session created");

        Ok(CreateCheckoutSessionResult { url: session.url })
    }

    async fn ensure_customer(&self, user: &UserSubscription) -> Result<String, SubscriptionError> {
        if let Some(customer_id) = &user.stripe_customer_id {
            return Ok(customer_id.clone());
        }

        let customer = self
            .gateway
            .create_customer(CreateCustomerRequest {
                user_id: user.user_id.clone(),
                email: user.email.clone(),
                name: user.display_name(),
            })
            .await?;

        self.users
            .update(
                &user.user_id,
                &SubscriptionUpdate::new().with_customer_id(customer.id.clone()),
            )
            .await?;

        tracing::info!(user_id = %user.user_id, customer_id = %customer.id, "Billing customer created");
        Ok(customer.id)
    }
}
