//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, auth)
//! - `subscription` - Subscription records, pending buffer and transition rules

pub mod foundation;
pub mod subscription;
