//! Stripe billing gateway adapter.
//!
//! Implements the `BillingGateway` port for Stripe, including:
//! - Lazy customer creation and checkout sessions
//! - Subscription reads and cancellation
//! - Payment intent lookup for first-invoice payment methods
//! - Webhook signature verification
//!
//! # Security
//!
//! - Webhook signatures use HMAC-SHA256 with constant-time comparison
//! - Timestamps are validated against replayed deliveries (5-minute window)
//! - All secrets are handled via `secrecy::SecretString`

mod mock_billing_gateway;
mod stripe_gateway;
mod webhook_types;

pub use mock_billing_gateway::{MethodCall, MockBillingGateway};
pub use stripe_gateway::{StripeBillingGateway, StripeConfig, STRIPE_API_BASE_URL};
pub use webhook_types::{
    hex_encode, Expandable, SignatureHeader, SignatureParseError, StripeInvoice,
    StripePaymentIntent, StripeSubscription, StripeWebhookEvent,
};
