//! HTTP handlers for subscription endpoints.
//!
//! These handlers connect Axum routes to the subscription command and query
//! handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Json, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;

use crate::adapters::http::middleware::RequireAuth;
use crate::application::handlers::subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CheckoutSettings,
    CreateCheckoutSessionCommand, CreateCheckoutSessionHandler, GetSubscriptionStatusHandler,
    GetSubscriptionStatusQuery, HandleBillingWebhookCommand, HandleBillingWebhookHandler,
    ReconcileBillingEventHandler,
};
use crate::domain::foundation::DomainError;
use crate::domain::subscription::SubscriptionError;
use crate::ports::{
    BillingGateway, Clock, PendingSubscriptionRepository, ReconcileOutbox, RetryPolicy,
    UserSubscriptionRepository,
};

use super::dto::{
    CancelSubscriptionResponse, CheckoutSessionResponse, ErrorResponse, StatusQueryParams,
    SubscriptionStatusResponse, WebhookReceivedResponse,
};

/// Header carrying the provider's webhook signature.
pub const STRIPE_SIGNATURE_HEADER: &str = "Stripe-Signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Request-independent knobs for the subscription endpoints.
#[derive(Debug, Clone)]
pub struct SubscriptionSettings {
    pub checkout: CheckoutSettings,
    pub retry_policy: RetryPolicy,
    /// Accept unsigned webhooks.
    pub test_mode: bool,
    pub synthesize_missing_period_end: bool,
}

/// Shared application state containing all dependencies.
///
/// Cloned for each request; every dependency is behind an `Arc`.
#[derive(Clone)]
pub struct SubscriptionAppState {
    pub users: Arc<dyn UserSubscriptionRepository>,
    pub pending: Arc<dyn PendingSubscriptionRepository>,
    pub outbox: Arc<dyn ReconcileOutbox>,
    pub gateway: Arc<dyn BillingGateway>,
    pub clock: Arc<dyn Clock>,
    pub settings: SubscriptionSettings,
}

impl SubscriptionAppState {
    /// Create handlers on demand from the shared state.
    pub fn reconciler(&self) -> ReconcileBillingEventHandler {
        ReconcileBillingEventHandler::new(
            self.users.clone(),
            self.pending.clone(),
            self.gateway.clone(),
            self.clock.clone(),
        )
    }

    pub fn webhook_handler(&self) -> HandleBillingWebhookHandler {
        HandleBillingWebhookHandler::new(
            self.gateway.clone(),
            Arc::new(self.reconciler()),
            self.outbox.clone(),
            self.clock.clone(),
            self.settings.retry_policy,
            self.settings.test_mode,
        )
    }

    pub fn checkout_handler(&self) -> CreateCheckoutSessionHandler {
        CreateCheckoutSessionHandler::new(
            self.users.clone(),
            self.gateway.clone(),
            self.settings.checkout.clone(),
        )
    }

    pub fn cancel_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(
            self.users.clone(),
            self.gateway.clone(),
            self.clock.clone(),
        )
    }

    pub fn status_handler(&self) -> GetSubscriptionStatusHandler {
        GetSubscriptionStatusHandler::new(
            self.users.clone(),
            self.gateway.clone(),
            self.clock.clone(),
            self.settings.synthesize_missing_period_end,
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook (no user auth, signature verified)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhook - Handle billing provider events
///
/// Authentic events are always acknowledged, including ones whose
/// reconciliation was deferred to the retry outbox.
pub async fn handle_billing_webhook(
    State(state): State<SubscriptionAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    // A header that is present but unreadable must not fall through to the
    // unsigned test-mode path.
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .map(|v| {
            v.to_str().map(str::to_string).map_err(|_| {
                SubscriptionError::invalid_webhook("Stripe-Signature header is not valid text")
            })
        })
        .transpose()?;

    let cmd = HandleBillingWebhookCommand {
        payload: body.to_vec(),
        signature,
    };

    state.webhook_handler().handle(cmd).await?;

    Ok(Json(WebhookReceivedResponse { received: true }))
}

// ════════════════════════════════════════════════════════════════════════════════
// User Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// POST /subscription/create-checkout-session - Start the Pro checkout flow
pub async fn create_checkout_session(
    State(state): State<SubscriptionAppState>,
    RequireAuth(user): RequireAuth,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let cmd = CreateCheckoutSessionCommand { user_id: user.id };

    let result = state.checkout_handler().handle(cmd).await?;

    Ok(Json(CheckoutSessionResponse::from(result)))
}

/// POST /subscription/cancel - Cancel at the end of the current period
pub async fn cancel_subscription(
    State(state): State<SubscriptionAppState>,
    RequireAuth(user): RequireAuth,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let cmd = CancelSubscriptionCommand { user_id: user.id };

    let result = state.cancel_handler().handle(cmd).await?;

    Ok(Json(CancelSubscriptionResponse::from(result)))
}

/// GET /subscription/status - Current subscription view
pub async fn get_subscription_status(
    State(state): State<SubscriptionAppState>,
    RequireAuth(user): RequireAuth,
    Query(params): Query<StatusQueryParams>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let query = GetSubscriptionStatusQuery {
        user_id: user.id,
        force_refresh: params.force_refresh(),
    };

    let result = state.status_handler().handle(query).await?;

    Ok(Json(SubscriptionStatusResponse::from(result)))
}

/// GET /health - Liveness probe
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts subscription errors to HTTP responses.
#[derive(Debug)]
pub struct SubscriptionApiError(SubscriptionError);

impl From<SubscriptionError> for SubscriptionApiError {
    fn from(err: SubscriptionError) -> Self {
        Self(err)
    }
}

impl From<DomainError> for SubscriptionApiError {
    fn from(err: DomainError) -> Self {
        Self(SubscriptionError::from(err))
    }
}

impl IntoResponse for SubscriptionApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            SubscriptionError::UserNotFound(_) => StatusCode::NOT_FOUND,
            SubscriptionError::AlreadySubscribed(_)
            | SubscriptionError::NoActiveSubscription(_)
            | SubscriptionError::MissingSignature
            | SubscriptionError::InvalidWebhook(_) => StatusCode::BAD_REQUEST,
            SubscriptionError::Gateway { .. } => StatusCode::BAD_GATEWAY,
            SubscriptionError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "Subscription request failed");
        }

        let mut body = ErrorResponse::new(self.0.code(), self.0.message());
        if matches!(self.0, SubscriptionError::AlreadySubscribed(_)) {
            body = body.redirect_to_manage();
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{
        FixedClock, InMemoryPendingSubscriptionRepository, InMemoryReconcileOutbox,
        InMemoryUserSubscriptionRepository, MockBillingGateway,
    };
    use crate::domain::foundation::{AuthenticatedUser, ErrorCode, Timestamp, UserId};
    use crate::domain::subscription::{SubscriptionStatus, SubscriptionTier, UserSubscription};

    fn uid() -> UserId {
        UserId::new("uid-1").unwrap()
    }

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(secs).unwrap()
    }

    fn test_state(users: Arc<InMemoryUserSubscriptionRepository>) -> SubscriptionAppState {
        SubscriptionAppState {
            users,
            pending: Arc::new(InMemoryPendingSubscriptionRepository::new()),
            outbox: Arc::new(InMemoryReconcileOutbox::new()),
            gateway: Arc::new(MockBillingGateway::with_active_subscription(
                "cus_1",
                "sub_1",
                ts(1_000),
                ts(2_000),
            )),
            clock: Arc::new(FixedClock::new(ts(1_500))),
            settings: SubscriptionSettings {
                checkout: CheckoutSettings::new("price_pro", "https://summarizz.app"),
                retry_policy: RetryPolicy::default(),
                test_mode: false,
                synthesize_missing_period_end: true,
            },
        }
    }

    fn auth() -> RequireAuth {
        RequireAuth(AuthenticatedUser::new(uid(), "ada@example.com"))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Error Mapping
    // ════════════════════════════════════════════════════════════════════════════

    fn status_for(err: SubscriptionError) -> StatusCode {
        SubscriptionApiError::from(err).into_response().status()
    }

    #[test]
    fn errors_map_to_status_codes() {
        assert_eq!(status_for(SubscriptionError::user_not_found(uid())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(SubscriptionError::already_subscribed(uid())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(SubscriptionError::no_active_subscription(uid())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(SubscriptionError::MissingSignature), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(SubscriptionError::invalid_webhook("bad signature")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(SubscriptionError::gateway("card_declined", false)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(SubscriptionError::infrastructure("db down")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn domain_errors_become_500() {
        let err = SubscriptionApiError::from(DomainError::new(ErrorCode::DatabaseError, "reset"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn already_subscribed_body_asks_for_redirect() {
        let response =
            SubscriptionApiError::from(SubscriptionError::already_subscribed(uid())).into_response();

        let json = body_json(response).await;
        assert_eq!(json["error"], "User already has an active subscription");
        assert_eq!(json["code"], "ALREADY_SUBSCRIBED");
        assert_eq!(json["redirectToManage"], true);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Handlers
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn status_handler_reads_stored_fields() {
        let users = Arc::new(InMemoryUserSubscriptionRepository::new());
        let mut user = UserSubscription::new(uid(), "ada@example.com");
        user.status = Some(SubscriptionStatus::Canceled);
        user.tier = Some(SubscriptionTier::Pro);
        user.period_end = Some(ts(2_000));
        users.insert(user);

        let response = get_subscription_status(
            State(test_state(users)),
            auth(),
            Query(StatusQueryParams::default()),
        )
        .await
        .unwrap()
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "canceled");
        assert_eq!(json["tier"], "pro");
        assert!(json["gracePeriodEnd"].is_null());
    }

    #[tokio::test]
    async fn cancel_without_subscription_is_rejected() {
        let users = Arc::new(InMemoryUserSubscriptionRepository::new());
        users.insert(UserSubscription::new(uid(), "ada@example.com"));

        let result = cancel_subscription(State(test_state(users)), auth()).await;

        let response = result.err().unwrap().into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "No active subscription found");
    }

    #[tokio::test]
    async fn webhook_without_signature_is_rejected_outside_test_mode() {
        let users = Arc::new(InMemoryUserSubscriptionRepository::new());

        let result =
            handle_billing_webhook(State(test_state(users)), HeaderMap::new(), Bytes::from("{}"))
                .await;

        let response = result.err().unwrap().into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Missing stripe-signature header");
    }

    #[test]
    fn state_is_clone_send_sync() {
        fn assert_bounds<T: Clone + Send + Sync>() {}
        assert_bounds::<SubscriptionAppState>();
    }
}
