//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `stripe` - Billing gateway (Stripe REST API and webhooks) plus its mock
//! - `postgres` - PostgreSQL stores for users, pending records and the retry outbox
//! - `memory` - In-memory stores for tests and local runs
//! - `auth` - Session token validation (HS256 JWT) plus its mock
//! - `http` - Axum routes, auth middleware and the application router
//! - `scheduler` - Interval runner for background jobs
//! - `clock` - System and fixed clocks

pub mod auth;
pub mod clock;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod scheduler;
pub mod stripe;

pub use auth::{JwtSessionValidator, MockSessionValidator};
pub use clock::{FixedClock, SystemClock};
pub use memory::{
    InMemoryPendingSubscriptionRepository, InMemoryReconcileOutbox,
    InMemoryUserSubscriptionRepository,
};
pub use postgres::{
    PostgresPendingSubscriptionRepository, PostgresReconcileOutbox,
    PostgresUserSubscriptionRepository,
};
pub use scheduler::JobRunner;
pub use stripe::{MockBillingGateway, StripeBillingGateway, StripeConfig};
