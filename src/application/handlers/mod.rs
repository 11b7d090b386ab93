//! Application handlers.
//!
//! Command, query and job handlers that orchestrate domain operations.

pub mod subscription;

pub use subscription::*;
