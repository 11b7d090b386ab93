//! HTTP adapter for subscription endpoints.
//!
//! - `POST /webhook` - Billing provider events (signature verified)
//! - `POST /subscription/create-checkout-session` - Start the Pro checkout flow
//! - `POST /subscription/cancel` - Cancel at period end
//! - `GET /subscription/status` - Current subscription view

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{
    health, SubscriptionApiError, SubscriptionAppState, SubscriptionSettings,
    STRIPE_SIGNATURE_HEADER,
};
pub use routes::{subscription_router, subscription_routes, webhook_routes};
