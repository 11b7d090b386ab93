//! Property-based tests for the reconciliation rules
//!
//! These tests pin down the time arithmetic the lifecycle depends on:
//! - The grace window is exactly seven days after the failure
//! - The sweeper demotes strictly after a deadline, never at it
//! - Event ordering accepts equal timestamps and rejects older ones
//! - Retry backoff grows and is capped

use proptest::prelude::*;

use summarizz_billing::domain::foundation::{Timestamp, UserId};
use summarizz_billing::domain::subscription::{
    grace_period_end, SubscriptionStatus, SubscriptionTier, SubscriptionUpdate, UserSubscription,
    GRACE_PERIOD_DAYS,
};
use summarizz_billing::ports::{RetryPolicy, MAX_RETRY_DELAY_SECS};

// ============================================================================
// Strategies
// ============================================================================

/// Unix seconds between 2020 and 2040.
fn arb_unix_secs() -> impl Strategy<Value = i64> {
    1_577_836_800i64..2_208_988_800i64
}

fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
    arb_unix_secs().prop_map(|secs| Timestamp::from_unix_secs(secs).unwrap())
}

fn arb_gated_status() -> impl Strategy<Value = SubscriptionStatus> {
    prop_oneof![
        Just(SubscriptionStatus::Active),
        Just(SubscriptionStatus::PastDue),
        Just(SubscriptionStatus::Canceled),
        Just(SubscriptionStatus::Free),
        "[a-z_]{4,12}".prop_map(|s| SubscriptionStatus::parse(&s)),
    ]
}

fn pro_user(status: SubscriptionStatus) -> UserSubscription {
    let mut user = UserSubscription::new(UserId::new("uid-1").unwrap(), "ada@example.com");
    user.status = Some(status);
    user.tier = Some(SubscriptionTier::Pro);
    user
}

// ============================================================================
// Grace Window
// ============================================================================

proptest! {
    #[test]
    fn grace_ends_exactly_seven_days_later(failed_at in arb_timestamp()) {
        let end = grace_period_end(failed_at);
        prop_assert_eq!(end.as_unix_secs() - failed_at.as_unix_secs(), GRACE_PERIOD_DAYS * 86_400);
    }

    #[test]
    fn payment_failure_overwrites_grace_from_processing_time(
        earlier in arb_timestamp(),
        now in arb_timestamp(),
    ) {
        let mut user = pro_user(SubscriptionStatus::Active);
        user.grace_period_end = Some(grace_period_end(earlier));

        user.apply(&SubscriptionUpdate::payment_failed(now));

        prop_assert_eq!(user.status, Some(SubscriptionStatus::PastDue));
        prop_assert_eq!(user.grace_period_end, Some(grace_period_end(now)));
        prop_assert_eq!(user.tier, Some(SubscriptionTier::Pro));
    }
}

// ============================================================================
// Sweeper Boundary
// ============================================================================

proptest! {
    #[test]
    fn past_due_is_demoted_only_after_grace(
        deadline in arb_timestamp(),
        offset in -864_000i64..864_000i64,
    ) {
        let mut user = pro_user(SubscriptionStatus::PastDue);
        user.grace_period_end = Some(deadline);
        let now = deadline.add_secs(offset);

        prop_assert_eq!(user.expiry_due(&now), offset > 0);
    }

    #[test]
    fn canceled_is_demoted_only_after_period_end(
        period_end in arb_timestamp(),
        offset in -864_000i64..864_000i64,
    ) {
        let mut user = pro_user(SubscriptionStatus::Canceled);
        user.period_end = Some(period_end);
        let now = period_end.add_secs(offset);

        prop_assert_eq!(user.expiry_due(&now), offset > 0);
    }

    #[test]
    fn only_pro_awaiting_expiry_is_ever_due(
        status in arb_gated_status(),
        deadline in arb_timestamp(),
    ) {
        let mut user = pro_user(status.clone());
        user.period_end = Some(deadline);
        user.grace_period_end = Some(deadline);
        let long_after = deadline.add_days(365);

        prop_assert_eq!(user.expiry_due(&long_after), status.awaits_expiry());

        user.tier = Some(SubscriptionTier::Free);
        prop_assert!(!user.expiry_due(&long_after));
    }

    #[test]
    fn demotion_is_a_fixed_point(status in arb_gated_status()) {
        let mut user = pro_user(status);
        user.apply(&SubscriptionUpdate::expiry_demotion());
        let once = user.clone();
        user.apply(&SubscriptionUpdate::expiry_demotion());

        prop_assert_eq!(&user, &once);
        prop_assert_eq!(user.tier, Some(SubscriptionTier::Free));
        prop_assert_eq!(user.status, Some(SubscriptionStatus::Canceled));
    }
}

// ============================================================================
// Event Ordering
// ============================================================================

proptest! {
    #[test]
    fn event_order_guard(last in arb_unix_secs(), delta in -86_400i64..86_400i64) {
        let mut user = pro_user(SubscriptionStatus::Active);
        user.last_event_at = Timestamp::from_unix_secs(last);
        let incoming = Timestamp::from_unix_secs(last + delta).unwrap();

        prop_assert_eq!(user.accepts_event_at(&incoming), delta >= 0);
    }

    #[test]
    fn first_event_is_always_accepted(at in arb_timestamp()) {
        let user = UserSubscription::new(UserId::new("uid-1").unwrap(), "ada@example.com");
        prop_assert!(user.accepts_event_at(&at));
    }
}

// ============================================================================
// Retry Backoff
// ============================================================================

proptest! {
    #[test]
    fn backoff_never_shrinks_and_is_capped(
        base in 1i64..3_600,
        attempts in 0u32..64,
    ) {
        let policy = RetryPolicy::new(base, 10);
        let this = policy.delay_after(attempts);
        let next = policy.delay_after(attempts + 1);

        prop_assert!(this >= base.min(MAX_RETRY_DELAY_SECS));
        prop_assert!(next >= this);
        prop_assert!(next <= MAX_RETRY_DELAY_SECS);
    }
}
