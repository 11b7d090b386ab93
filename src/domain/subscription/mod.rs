//! Subscription domain module.
//!
//! Models the subscription subset of a user, the pending-association buffer
//! and the rules that turn billing events into field overwrites.
//!
//! # Module Structure
//!
//! - `status` - SubscriptionStatus and SubscriptionTier
//! - `record` - UserSubscription and the SubscriptionUpdate patch
//! - `pending` - PendingSubscription buffer record
//! - `transitions` - reconciliation rules (grace window, demotion, link-back)
//! - `errors` - SubscriptionError

mod errors;
mod pending;
mod record;
mod status;
mod transitions;

pub use errors::SubscriptionError;
pub use pending::PendingSubscription;
pub use record::{SubscriptionUpdate, UserSubscription};
pub use status::{SubscriptionStatus, SubscriptionTier};
pub use transitions::{
    fallback_period_end, grace_period_end, GRACE_PERIOD_DAYS, PERIOD_END_FALLBACK_DAYS,
};
