//! HTTP adapters - REST API implementations.

pub mod middleware;
pub mod router;
pub mod subscription;

pub use middleware::{auth_middleware, AuthState, RequireAuth};
pub use router::{app_router, HttpSettings};
pub use subscription::{subscription_router, SubscriptionAppState, SubscriptionSettings};
