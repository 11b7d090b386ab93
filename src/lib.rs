//! Summarizz Billing - subscription lifecycle reconciler.
//!
//! Keeps the subscription fields of Summarizz user records in step with
//! Stripe: webhook events are turned into field overwrites, subscriptions that
//! arrive before their owner is known are buffered and linked later, and
//! expired Pro access is demoted by a periodic sweep.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
