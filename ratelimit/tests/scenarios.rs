use proptest::prelude::*;

use trustgate_ratelimit::{
    Denial, LimitType, RateLimitState, RateLimiter, HOUR_SECS,
};
use trustgate_types::{
    AccountAddress, ChannelRateLimitConfig, GlobalRateLimitConfig, Timestamp,
};

fn account_config(per_hour: u32, cooldown: u64) -> ChannelRateLimitConfig {
    ChannelRateLimitConfig {
        account_limit_per_hour: per_hour,
        account_limit_per_day: 0,
        cooldown_seconds: cooldown,
        ..ChannelRateLimitConfig::sms()
    }
}

fn limiter(config: ChannelRateLimitConfig) -> RateLimiter {
    RateLimiter::new(config, GlobalRateLimitConfig::defaults()).unwrap()
}

fn account() -> RateLimitState {
    RateLimitState::for_account(&AccountAddress::new("acct_scenario"))
}

/// Five requests a minute apart are allowed; the sixth in the same hour is not.
#[test]
fn hourly_quota_with_cooldown() {
    let rl = limiter(account_config(5, 60));
    let t0 = Timestamp::new(1_700_000_000);
    let mut state = account();

    for i in 0..5 {
        let (check, next) = rl.check_and_record(state, t0.plus_secs(i * 60));
        assert!(check.allowed, "request {i} should be allowed");
        state = next;
    }

    let sixth = rl.check(&state, t0.plus_secs(5 * 60));
    assert!(!sixth.allowed);
    assert_eq!(sixth.limit_type, Some(LimitType::Account));
    assert_eq!(sixth.denial, Some(Denial::HourlyQuota));
    assert!(sixth.retry_after_secs > 0);
    assert_eq!(sixth.retry_after_secs, HOUR_SECS - 5 * 60);
}

/// One second before the window closes still counts against it; at the hour it resets.
#[test]
fn hourly_window_boundary() {
    let rl = limiter(account_config(5, 60));
    let t0 = Timestamp::new(1_700_000_000);
    let mut state = account();
    for i in 0..5 {
        state = rl.record(state, t0.plus_secs(i * 60));
    }
    assert_eq!(state.hourly_window_start, t0);

    let just_inside = rl.check(&state, t0.plus_secs(HOUR_SECS - 1));
    assert!(!just_inside.allowed);
    assert_eq!(just_inside.retry_after_secs, 1);

    let at_boundary = rl.check(&state, t0.plus_secs(HOUR_SECS));
    assert!(at_boundary.allowed);
    assert_eq!(at_boundary.remaining_hourly, Some(5));

    let (_, rolled) = rl.check_and_record(state, t0.plus_secs(HOUR_SECS));
    assert_eq!(rolled.hourly_count, 1);
    assert_eq!(rolled.hourly_window_start, t0.plus_secs(HOUR_SECS));
}

/// Two requests from the same phone 30 seconds apart with a 60 second cooldown.
#[test]
fn phone_cooldown_reports_remaining_wait() {
    let config = ChannelRateLimitConfig {
        cooldown_seconds: 60,
        ..ChannelRateLimitConfig::sms()
    };
    let rl = limiter(config);
    let t0 = Timestamp::new(1_700_000_000);
    let (first, state) = rl.check_and_record(RateLimitState::for_phone("+15550100000"), t0);
    assert!(first.allowed);

    let second = rl.check(&state, t0.plus_secs(30));
    assert!(!second.allowed);
    assert_eq!(second.limit_type, Some(LimitType::Phone));
    assert_eq!(second.denial, Some(Denial::Cooldown));
    assert_eq!(second.retry_after_secs, 30);
}

/// A 24h block denies at +23h with its reason and lifts by itself at +25h.
#[test]
fn block_then_automatic_unblock() {
    let rl = limiter(ChannelRateLimitConfig::sms());
    let now = Timestamp::new(1_700_000_000);
    let blocked = rl.block(account(), now, Some(24 * HOUR_SECS), "abuse");

    let during = rl.check(&blocked, now.plus_secs(23 * HOUR_SECS));
    assert!(!during.allowed);
    assert_eq!(during.denial, Some(Denial::Blocked));
    assert!(during.reason.contains("abuse"));
    assert_eq!(during.retry_after_secs, HOUR_SECS);
    assert_eq!(during.blocked_until, Some(now.plus_secs(24 * HOUR_SECS)));

    let after = rl.check(&blocked, now.plus_secs(25 * HOUR_SECS));
    assert!(after.allowed);

    let (_, recorded) = rl.check_and_record(blocked, now.plus_secs(25 * HOUR_SECS));
    assert!(!recorded.is_blocked);
    assert_eq!(recorded.blocked_until, None);
    assert_eq!(recorded.total_blocks, 1);
}

proptest! {
    /// However requests are spaced, an entity never exceeds its hourly quota in one window.
    #[test]
    fn hourly_count_never_exceeds_limit(
        limit in 1u32..10,
        gaps in prop::collection::vec(0u64..900, 1..60),
    ) {
        let rl = limiter(account_config(limit, 0));
        let mut now = Timestamp::new(1_000_000);
        let mut state = account();
        for gap in gaps {
            now = now.plus_secs(gap);
            let (_, next) = rl.check_and_record(state, now);
            prop_assert!(next.hourly_count <= limit);
            state = next;
        }
    }

    /// Cooldown denials always ask the caller to wait exactly the rest of the cooldown.
    #[test]
    fn cooldown_retry_after_is_exact(cooldown in 1u64..3600, elapsed in 0u64..3600) {
        prop_assume!(elapsed < cooldown);
        let rl = limiter(account_config(0, cooldown));
        let t0 = Timestamp::new(2_000_000);
        let state = rl.record(account(), t0);
        let check = rl.check(&state, t0.plus_secs(elapsed));
        prop_assert!(!check.allowed);
        prop_assert_eq!(check.retry_after_secs, cooldown - elapsed);
    }
}
