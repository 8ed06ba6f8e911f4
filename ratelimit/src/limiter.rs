//! Quota, cooldown and block evaluation.

use serde::{Deserialize, Serialize};
use trustgate_types::{ChannelRateLimitConfig, GlobalRateLimitConfig, Timestamp};
use trustgate_utils::format_duration;

use crate::error::RateLimitError;
use crate::state::{
    EntityKind, GlobalRateLimitState, RateLimitState, DAY_SECS, HOUR_SECS, MINUTE_SECS,
};

/// Which dimension produced a denial.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitType {
    Account,
    Phone,
    Ip,
    Global,
}

impl From<EntityKind> for LimitType {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Account => Self::Account,
            EntityKind::Phone => Self::Phone,
            EntityKind::Ip => Self::Ip,
        }
    }
}

/// Why a request was denied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Denial {
    Blocked,
    Cooldown,
    HourlyQuota,
    DailyQuota,
    MinuteQuota,
}

/// Outcome of a rate-limit check.
///
/// `remaining_*` of `None` means the window is unlimited.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitCheck {
    pub allowed: bool,
    pub limit_type: Option<LimitType>,
    pub denial: Option<Denial>,
    pub retry_after_secs: u64,
    pub remaining_hourly: Option<u32>,
    pub remaining_daily: Option<u32>,
    pub blocked_until: Option<Timestamp>,
    pub reason: String,
}

impl RateLimitCheck {
    fn allow(remaining_hourly: Option<u32>, remaining_daily: Option<u32>) -> Self {
        Self {
            allowed: true,
            limit_type: None,
            denial: None,
            retry_after_secs: 0,
            remaining_hourly,
            remaining_daily,
            blocked_until: None,
            reason: String::new(),
        }
    }

    fn deny(limit_type: LimitType, denial: Denial, retry_after_secs: u64, reason: String) -> Self {
        Self {
            allowed: false,
            limit_type: Some(limit_type),
            denial: Some(denial),
            retry_after_secs,
            remaining_hourly: None,
            remaining_daily: None,
            blocked_until: None,
            reason,
        }
    }

    /// Unlimited allowance, used when a channel is disabled.
    fn unlimited() -> Self {
        Self::allow(None, None)
    }
}

/// Rate limiter for one verification channel.
///
/// Holds only validated policy; all counters live in the snapshots passed in.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    config: ChannelRateLimitConfig,
    global: GlobalRateLimitConfig,
}

impl RateLimiter {
    /// Build a limiter, rejecting an invalid config.
    pub fn new(
        config: ChannelRateLimitConfig,
        global: GlobalRateLimitConfig,
    ) -> Result<Self, RateLimitError> {
        config.validate()?;
        global.validate()?;
        Ok(Self { config, global })
    }

    pub fn config(&self) -> &ChannelRateLimitConfig {
        &self.config
    }

    pub fn global_config(&self) -> &GlobalRateLimitConfig {
        &self.global
    }

    fn limits_for(&self, kind: EntityKind) -> (u32, u32) {
        match kind {
            EntityKind::Account => (
                self.config.account_limit_per_hour,
                self.config.account_limit_per_day,
            ),
            EntityKind::Phone => (
                self.config.phone_limit_per_hour,
                self.config.phone_limit_per_day,
            ),
            EntityKind::Ip => (self.config.ip_limit_per_hour, self.config.ip_limit_per_day),
        }
    }

    /// Evaluate one more request from this entity at `now` without recording it.
    ///
    /// Order: active block, cooldown, hourly quota, daily quota.
    pub fn check(&self, state: &RateLimitState, now: Timestamp) -> RateLimitCheck {
        if !self.config.enabled {
            return RateLimitCheck::unlimited();
        }
        let limit_type = LimitType::from(state.entity_kind);
        let kind = state.entity_kind.as_str();

        if state.block_active(now) {
            let retry_after = state
                .blocked_until
                .map_or(0, |until| until.secs_until(now));
            let mut result = RateLimitCheck::deny(
                limit_type,
                Denial::Blocked,
                retry_after,
                format!("{kind} blocked: {}", state.block_reason),
            );
            result.blocked_until = state.blocked_until;
            return result;
        }

        let rolled = state.rolled(now);

        if self.config.cooldown_seconds > 0 {
            if let Some(last) = rolled.last_request_at {
                let elapsed = last.elapsed_since(now);
                if elapsed < self.config.cooldown_seconds {
                    let wait = self.config.cooldown_seconds - elapsed;
                    return RateLimitCheck::deny(
                        limit_type,
                        Denial::Cooldown,
                        wait,
                        format!("{kind} cooldown, retry in {}", format_duration(wait)),
                    );
                }
            }
        }

        let (hourly_limit, daily_limit) = self.limits_for(state.entity_kind);

        if hourly_limit > 0 && rolled.hourly_count >= hourly_limit {
            let wait = rolled
                .hourly_window_start
                .plus_secs(HOUR_SECS)
                .secs_until(now);
            return RateLimitCheck::deny(
                limit_type,
                Denial::HourlyQuota,
                wait,
                format!(
                    "{kind} hourly limit {hourly_limit} reached, retry in {}",
                    format_duration(wait)
                ),
            );
        }

        if daily_limit > 0 && rolled.daily_count >= daily_limit {
            let wait = rolled
                .daily_window_start
                .plus_secs(DAY_SECS)
                .secs_until(now);
            return RateLimitCheck::deny(
                limit_type,
                Denial::DailyQuota,
                wait,
                format!(
                    "{kind} daily limit {daily_limit} reached, retry in {}",
                    format_duration(wait)
                ),
            );
        }

        RateLimitCheck::allow(
            remaining(hourly_limit, rolled.hourly_count),
            remaining(daily_limit, rolled.daily_count),
        )
    }

    /// Count one request at `now`, rolling windows and lifting elapsed blocks first.
    pub fn record(&self, state: RateLimitState, now: Timestamp) -> RateLimitState {
        let mut next = state.rolled(now);
        next.hourly_count = next.hourly_count.saturating_add(1);
        next.daily_count = next.daily_count.saturating_add(1);
        next.last_request_at = Some(now);
        next.total_requests = next.total_requests.saturating_add(1);
        next
    }

    /// Check, and record only if allowed. Remaining quota reflects the recorded request.
    pub fn check_and_record(
        &self,
        state: RateLimitState,
        now: Timestamp,
    ) -> (RateLimitCheck, RateLimitState) {
        let mut result = self.check(&state, now);
        if !result.allowed {
            tracing::warn!(
                entity = state.entity_kind.as_str(),
                entity_hash = %state.entity_hash,
                denial = ?result.denial,
                retry_after = result.retry_after_secs,
                "rate limit denied"
            );
            return (result, state);
        }
        let next = self.record(state, now);
        if self.config.enabled {
            let (hourly_limit, daily_limit) = self.limits_for(next.entity_kind);
            result.remaining_hourly = remaining(hourly_limit, next.hourly_count);
            result.remaining_daily = remaining(daily_limit, next.daily_count);
        }
        (result, next)
    }

    /// Block an entity until `now + duration` (channel default when `None`).
    pub fn block(
        &self,
        state: RateLimitState,
        now: Timestamp,
        duration_secs: Option<u64>,
        reason: impl Into<String>,
    ) -> RateLimitState {
        let duration = duration_secs.unwrap_or(self.config.block_duration_seconds);
        let mut next = state.rolled(now);
        next.is_blocked = true;
        next.blocked_until = Some(now.plus_secs(duration));
        next.block_reason = reason.into();
        next.total_blocks = next.total_blocks.saturating_add(1);
        tracing::info!(
            entity = next.entity_kind.as_str(),
            entity_hash = %next.entity_hash,
            until = %now.plus_secs(duration),
            reason = %next.block_reason,
            "entity blocked"
        );
        next
    }

    /// Lift a block immediately.
    pub fn unblock(&self, mut state: RateLimitState) -> RateLimitState {
        state.is_blocked = false;
        state.blocked_until = None;
        state.block_reason.clear();
        state
    }

    /// Evaluate the network-wide per-minute ceiling.
    pub fn check_global(&self, state: &GlobalRateLimitState, now: Timestamp) -> RateLimitCheck {
        if !self.global.enabled {
            return RateLimitCheck::unlimited();
        }
        let rolled = state.rolled(now);
        let limit = self.global.limit_per_minute;
        if rolled.minute_count >= limit {
            let wait = rolled
                .minute_window_start
                .plus_secs(MINUTE_SECS)
                .secs_until(now);
            return RateLimitCheck::deny(
                LimitType::Global,
                Denial::MinuteQuota,
                wait,
                format!("global limit {limit}/min reached, retry in {}", format_duration(wait)),
            );
        }
        RateLimitCheck::allow(None, None)
    }

    pub fn record_global(&self, state: GlobalRateLimitState, now: Timestamp) -> GlobalRateLimitState {
        let mut next = state.rolled(now);
        next.minute_count = next.minute_count.saturating_add(1);
        next.total_requests = next.total_requests.saturating_add(1);
        next
    }
}

fn remaining(limit: u32, count: u32) -> Option<u32> {
    (limit > 0).then(|| limit.saturating_sub(count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustgate_types::{AccountAddress, ParamError};

    fn limiter(config: ChannelRateLimitConfig) -> RateLimiter {
        RateLimiter::new(config, GlobalRateLimitConfig::defaults()).unwrap()
    }

    fn account() -> RateLimitState {
        RateLimitState::for_account(&AccountAddress::new("acct_1"))
    }

    #[test]
    fn invalid_config_rejected() {
        let config = ChannelRateLimitConfig {
            ip_limit_per_hour: 10,
            ip_limit_per_day: 1,
            ..ChannelRateLimitConfig::sms()
        };
        let err = RateLimiter::new(config, GlobalRateLimitConfig::defaults()).unwrap_err();
        assert!(matches!(
            err,
            RateLimitError::InvalidConfig(ParamError { field: "ip_limit_per_day", .. })
        ));
    }

    #[test]
    fn fresh_entity_allowed_with_full_quota() {
        let rl = limiter(ChannelRateLimitConfig::sms());
        let check = rl.check(&account(), Timestamp::new(10_000));
        assert!(check.allowed);
        assert_eq!(check.remaining_hourly, Some(5));
        assert_eq!(check.remaining_daily, Some(10));
    }

    #[test]
    fn check_does_not_mutate() {
        let rl = limiter(ChannelRateLimitConfig::sms());
        let state = account();
        let _ = rl.check(&state, Timestamp::new(10_000));
        assert_eq!(state.total_requests, 0);
    }

    #[test]
    fn record_advances_counters() {
        let rl = limiter(ChannelRateLimitConfig::sms());
        let next = rl.record(account(), Timestamp::new(10_000));
        assert_eq!(next.hourly_count, 1);
        assert_eq!(next.daily_count, 1);
        assert_eq!(next.total_requests, 1);
        assert_eq!(next.last_request_at, Some(Timestamp::new(10_000)));
    }

    #[test]
    fn remaining_reflects_recorded_request() {
        let rl = limiter(ChannelRateLimitConfig::sms());
        let (check, _) = rl.check_and_record(account(), Timestamp::new(10_000));
        assert!(check.allowed);
        assert_eq!(check.remaining_hourly, Some(4));
        assert_eq!(check.remaining_daily, Some(9));
    }

    #[test]
    fn denied_request_is_not_recorded() {
        let rl = limiter(ChannelRateLimitConfig::sms());
        let (_, state) = rl.check_and_record(account(), Timestamp::new(10_000));
        let (check, after) = rl.check_and_record(state.clone(), Timestamp::new(10_010));
        assert!(!check.allowed);
        assert_eq!(check.denial, Some(Denial::Cooldown));
        assert_eq!(after, state);
    }

    #[test]
    fn daily_quota_denies_across_hours() {
        let config = ChannelRateLimitConfig {
            account_limit_per_hour: 0,
            account_limit_per_day: 2,
            cooldown_seconds: 0,
            ..ChannelRateLimitConfig::sms()
        };
        let rl = limiter(config);
        let t0 = Timestamp::new(100_000);
        let s = rl.record(account(), t0);
        let s = rl.record(s, t0.plus_secs(2 * HOUR_SECS));
        let check = rl.check(&s, t0.plus_secs(5 * HOUR_SECS));
        assert!(!check.allowed);
        assert_eq!(check.denial, Some(Denial::DailyQuota));
        assert_eq!(check.retry_after_secs, DAY_SECS - 5 * HOUR_SECS);
        assert_eq!(check.remaining_hourly, None);
    }

    #[test]
    fn unlimited_windows_report_none() {
        let config = ChannelRateLimitConfig {
            account_limit_per_hour: 0,
            account_limit_per_day: 0,
            ..ChannelRateLimitConfig::sms()
        };
        let check = limiter(config).check(&account(), Timestamp::new(1));
        assert!(check.allowed);
        assert_eq!(check.remaining_hourly, None);
        assert_eq!(check.remaining_daily, None);
    }

    #[test]
    fn disabled_channel_allows_everything() {
        let config = ChannelRateLimitConfig {
            enabled: false,
            ..ChannelRateLimitConfig::sms()
        };
        let rl = limiter(config);
        let mut s = account();
        for i in 0..50 {
            let (check, next) = rl.check_and_record(s, Timestamp::new(1000 + i));
            assert!(check.allowed);
            s = next;
        }
    }

    #[test]
    fn block_uses_channel_default_duration() {
        let rl = limiter(ChannelRateLimitConfig::sms());
        let blocked = rl.block(account(), Timestamp::new(1000), None, "abuse");
        assert_eq!(blocked.blocked_until, Some(Timestamp::new(1000 + DAY_SECS)));
        assert_eq!(blocked.total_blocks, 1);
    }

    #[test]
    fn unblock_lifts_immediately() {
        let rl = limiter(ChannelRateLimitConfig::sms());
        let blocked = rl.block(account(), Timestamp::new(1000), Some(500), "abuse");
        let check = rl.check(&rl.unblock(blocked), Timestamp::new(1001));
        assert!(check.allowed);
    }

    #[test]
    fn global_minute_window() {
        let rl = RateLimiter::new(
            ChannelRateLimitConfig::sms(),
            GlobalRateLimitConfig {
                enabled: true,
                limit_per_minute: 2,
            },
        )
        .unwrap();
        let t0 = Timestamp::new(5000);
        let g = rl.record_global(GlobalRateLimitState::new(), t0);
        let g = rl.record_global(g, t0.plus_secs(10));
        let denied = rl.check_global(&g, t0.plus_secs(20));
        assert!(!denied.allowed);
        assert_eq!(denied.limit_type, Some(LimitType::Global));
        assert_eq!(denied.retry_after_secs, 40);
        assert!(rl.check_global(&g, t0.plus_secs(60)).allowed);
    }
}
