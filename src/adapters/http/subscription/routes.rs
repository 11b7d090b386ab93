//! Axum router configuration for subscription endpoints.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::adapters::http::middleware::{auth_middleware, AuthState};

use super::handlers::{
    cancel_subscription, create_checkout_session, get_subscription_status,
    handle_billing_webhook, SubscriptionAppState,
};

/// Create the authenticated subscription router.
///
/// # Routes
/// - `POST /create-checkout-session` - Start the Pro checkout flow
/// - `POST /cancel` - Cancel at period end
/// - `GET /status` - Current subscription view (`?forceRefresh=true` re-reads the provider)
pub fn subscription_routes(auth: AuthState) -> Router<SubscriptionAppState> {
    Router::new()
        .route("/create-checkout-session", post(create_checkout_session))
        .route("/cancel", post(cancel_subscription))
        .route("/status", get(get_subscription_status))
        .route_layer(middleware::from_fn_with_state(auth, auth_middleware))
}

/// Create the webhook router.
///
/// Separate from the subscription routes because the provider authenticates
/// with a signature over the raw body, not a session token.
pub fn webhook_routes() -> Router<SubscriptionAppState> {
    Router::new().route("/webhook", post(handle_billing_webhook))
}

/// Create the complete subscription module router, suitable for mounting at
/// the application root.
pub fn subscription_router(auth: AuthState) -> Router<SubscriptionAppState> {
    Router::new()
        .nest("/subscription", subscription_routes(auth))
        .merge(webhook_routes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::adapters::auth::MockSessionValidator;
    use crate::adapters::{
        FixedClock, InMemoryPendingSubscriptionRepository, InMemoryReconcileOutbox,
        InMemoryUserSubscriptionRepository, MockBillingGateway,
    };
    use crate::adapters::http::subscription::SubscriptionSettings;
    use crate::application::handlers::subscription::CheckoutSettings;
    use crate::domain::foundation::Timestamp;
    use crate::ports::RetryPolicy;

    fn test_state() -> SubscriptionAppState {
        SubscriptionAppState {
            users: Arc::new(InMemoryUserSubscriptionRepository::new()),
            pending: Arc::new(InMemoryPendingSubscriptionRepository::new()),
            outbox: Arc::new(InMemoryReconcileOutbox::new()),
            gateway: Arc::new(MockBillingGateway::new()),
            clock: Arc::new(FixedClock::new(Timestamp::now())),
            settings: SubscriptionSettings {
                checkout: CheckoutSettings::new("price_pro", "http://localhost:3001"),
                retry_policy: RetryPolicy::default(),
                test_mode: true,
                synthesize_missing_period_end: true,
            },
        }
    }

    fn auth() -> AuthState {
        AuthState::new(Arc::new(MockSessionValidator::new()))
    }

    #[test]
    fn subscription_routes_creates_router() {
        let _: Router<()> = subscription_routes(auth()).with_state(test_state());
    }

    #[test]
    fn webhook_routes_creates_router() {
        let _: Router<()> = webhook_routes().with_state(test_state());
    }

    #[test]
    fn subscription_router_creates_combined_router() {
        let _: Router<()> = subscription_router(auth()).with_state(test_state());
    }
}
