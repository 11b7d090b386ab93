//! Subscription status and tier value objects.
//!
//! Statuses are stored and served as the provider's own strings. The four
//! values the platform gates features on have named variants; anything else
//! Stripe reports is carried through untouched in `Other`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subscription status as stored on the user record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubscriptionStatus {
    /// Paid and current.
    Active,

    /// Latest invoice failed; access continues until the grace period ends.
    PastDue,

    /// Canceled, either awaiting period end or already demoted.
    Canceled,

    /// No paid subscription.
    Free,

    /// Provider status with no platform meaning (`trialing`, `incomplete`, ...).
    Other(String),
}

impl SubscriptionStatus {
    /// Parses a provider or stored status string.
    pub fn parse(value: &str) -> Self {
        match value {
            "active" => SubscriptionStatus::Active,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" => SubscriptionStatus::Canceled,
            "free" => SubscriptionStatus::Free,
            other => SubscriptionStatus::Other(other.to_string()),
        }
    }

    /// Returns the wire/storage representation.
    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Free => "free",
            SubscriptionStatus::Other(value) => value,
        }
    }

    /// Statuses the expiry sweeper inspects.
    pub fn awaits_expiry(&self) -> bool {
        matches!(self, SubscriptionStatus::Canceled | SubscriptionStatus::PastDue)
    }
}

impl From<String> for SubscriptionStatus {
    fn from(value: String) -> Self {
        SubscriptionStatus::parse(&value)
    }
}

impl From<SubscriptionStatus> for String {
    fn from(status: SubscriptionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feature tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Pro,
    Free,
}

impl SubscriptionTier {
    /// Parses a stored tier string. Unknown values are treated as free.
    pub fn parse(value: &str) -> Self {
        match value {
            "pro" => SubscriptionTier::Pro,
            _ => SubscriptionTier::Free,
        }
    }

    /// Returns the storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Pro => "pro",
            SubscriptionTier::Free => "free",
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_statuses_parse_to_named_variants() {
        assert_eq!(SubscriptionStatus::parse("active"), SubscriptionStatus::Active);
        assert_eq!(SubscriptionStatus::parse("past_due"), SubscriptionStatus::PastDue);
        assert_eq!(SubscriptionStatus::parse("canceled"), SubscriptionStatus::Canceled);
        assert_eq!(SubscriptionStatus::parse("free"), SubscriptionStatus::Free);
    }

    #[test]
    fn provider_statuses_pass_through() {
        let status = SubscriptionStatus::parse("trialing");
        assert_eq!(status, SubscriptionStatus::Other("trialing".to_string()));
        assert_eq!(status.as_str(), "trialing");
    }

    #[test]
    fn status_serializes_as_plain_string() {
        let json = serde_json::to_string(&SubscriptionStatus::PastDue).unwrap();
        assert_eq!(json, "\"past_due\"");

        let back: SubscriptionStatus = serde_json::from_str("\"incomplete\"").unwrap();
        assert_eq!(back.as_str(), "incomplete");
    }

    #[test]
    fn only_canceled_and_past_due_await_expiry() {
        assert!(SubscriptionStatus::Canceled.awaits_expiry());
        assert!(SubscriptionStatus::PastDue.awaits_expiry());
        assert!(!SubscriptionStatus::Active.awaits_expiry());
        assert!(!SubscriptionStatus::Free.awaits_expiry());
        assert!(!SubscriptionStatus::parse("unpaid").awaits_expiry());
    }

    #[test]
    fn tier_roundtrips_through_strings() {
        assert_eq!(SubscriptionTier::parse("pro"), SubscriptionTier::Pro);
        assert_eq!(SubscriptionTier::parse("free"), SubscriptionTier::Free);
        assert_eq!(SubscriptionTier::Pro.to_string(), "pro");
        assert_eq!(serde_json::to_string(&SubscriptionTier::Free).unwrap(), "\"free\"");
    }
}
