//! Policy parameters supplied by the caller.
//!
//! In a ledger deployment these come from on-chain governance. Each struct has
//! a `validate()` that rejects contradictory values; the engine refuses an
//! invalid config rather than normalising it.

use crate::error::ParamError;
use crate::factor::FactorKind;
use serde::{Deserialize, Serialize};

/// Upper bound of the opaque confidence score.
pub const MAX_SCORE: u32 = 100;

// ── Borderline band ──────────────────────────────────────────────────────

/// Thresholds and factor policy for the borderline band `[lower, upper)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderlineParams {
    /// Scores strictly below this are rejected.
    pub lower_threshold: u32,
    /// Scores at or above this are verified outright.
    pub upper_threshold: u32,
    /// When disabled, in-band scores cannot be escalated.
    pub enabled: bool,
    /// Factors that count towards resolving an escalation.
    pub required_factors: Vec<FactorKind>,
    /// Lifetime of a fallback record and its backing challenge.
    pub challenge_timeout_secs: u64,
    /// How many distinct required factors must be satisfied.
    pub min_factors_satisfied: u32,
}

impl BorderlineParams {
    pub fn defaults() -> Self {
        Self {
            lower_threshold: 60,
            upper_threshold: 85,
            enabled: true,
            required_factors: vec![FactorKind::Sms, FactorKind::Email],
            challenge_timeout_secs: 600, // 10 minutes
            min_factors_satisfied: 1,
        }
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        if self.lower_threshold > self.upper_threshold {
            return Err(ParamError::new(
                "lower_threshold",
                format!(
                    "{} exceeds upper_threshold {}",
                    self.lower_threshold, self.upper_threshold
                ),
            ));
        }
        if self.upper_threshold > MAX_SCORE {
            return Err(ParamError::new(
                "upper_threshold",
                format!("{} exceeds {MAX_SCORE}", self.upper_threshold),
            ));
        }
        if !self.enabled {
            return Ok(());
        }
        if self.required_factors.is_empty() {
            return Err(ParamError::new(
                "required_factors",
                "must not be empty when escalation is enabled",
            ));
        }
        if self.challenge_timeout_secs == 0 {
            return Err(ParamError::new(
                "challenge_timeout_secs",
                "must be positive when escalation is enabled",
            ));
        }
        let distinct = {
            let mut f = self.required_factors.clone();
            f.sort();
            f.dedup();
            f.len() as u32
        };
        if self.min_factors_satisfied == 0 || self.min_factors_satisfied > distinct {
            return Err(ParamError::new(
                "min_factors_satisfied",
                format!(
                    "{} must be between 1 and the {distinct} distinct required factors",
                    self.min_factors_satisfied
                ),
            ));
        }
        Ok(())
    }
}

impl Default for BorderlineParams {
    fn default() -> Self {
        Self::defaults()
    }
}

// ── Challenges ───────────────────────────────────────────────────────────

/// Lifetime policy for out-of-band challenges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeParams {
    /// TTL used when the caller passes a non-positive TTL.
    pub default_ttl_secs: u64,
    /// Longest TTL a caller may request.
    pub max_ttl_secs: u64,
}

impl ChallengeParams {
    pub fn defaults() -> Self {
        Self {
            default_ttl_secs: 300,   // 5 minutes
            max_ttl_secs: 24 * 3600, // 1 day
        }
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        if self.default_ttl_secs == 0 {
            return Err(ParamError::new("default_ttl_secs", "must be positive"));
        }
        if self.default_ttl_secs > self.max_ttl_secs {
            return Err(ParamError::new(
                "default_ttl_secs",
                format!("exceeds max_ttl_secs {}", self.max_ttl_secs),
            ));
        }
        Ok(())
    }
}

impl Default for ChallengeParams {
    fn default() -> Self {
        Self::defaults()
    }
}

// ── Request queue ────────────────────────────────────────────────────────

/// Retry and validation policy for verification requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueParams {
    /// Maximum number of retries before a request is forced to `Failed`.
    pub max_retries: u32,
    /// Maximum number of scopes a single request may claim.
    pub max_scopes_per_request: u32,
    /// An in-progress attempt older than this is swept to `Timeout`.
    pub request_timeout_secs: u64,
}

impl QueueParams {
    pub fn defaults() -> Self {
        Self {
            max_retries: 3,
            max_scopes_per_request: 16,
            request_timeout_secs: 15 * 60,
        }
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        if self.max_scopes_per_request == 0 {
            return Err(ParamError::new("max_scopes_per_request", "must be positive"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ParamError::new("request_timeout_secs", "must be positive"));
        }
        Ok(())
    }
}

impl Default for QueueParams {
    fn default() -> Self {
        Self::defaults()
    }
}

// ── Rate limits ──────────────────────────────────────────────────────────

/// Per-channel quota policy. A limit of 0 means that window is unlimited.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelRateLimitConfig {
    pub enabled: bool,
    pub account_limit_per_hour: u32,
    pub account_limit_per_day: u32,
    pub phone_limit_per_hour: u32,
    pub phone_limit_per_day: u32,
    pub ip_limit_per_hour: u32,
    pub ip_limit_per_day: u32,
    /// Minimum spacing between two requests from the same entity.
    pub cooldown_seconds: u64,
    /// Default duration of an abuse block.
    pub block_duration_seconds: u64,
}

impl ChannelRateLimitConfig {
    /// SMS OTP delivery: the most expensive channel, tightest quotas.
    pub fn sms() -> Self {
        Self {
            enabled: true,
            account_limit_per_hour: 5,
            account_limit_per_day: 10,
            phone_limit_per_hour: 3,
            phone_limit_per_day: 5,
            ip_limit_per_hour: 10,
            ip_limit_per_day: 50,
            cooldown_seconds: 60,
            block_duration_seconds: 24 * 3600,
        }
    }

    pub fn email() -> Self {
        Self {
            enabled: true,
            account_limit_per_hour: 10,
            account_limit_per_day: 20,
            phone_limit_per_hour: 0,
            phone_limit_per_day: 0,
            ip_limit_per_hour: 20,
            ip_limit_per_day: 100,
            cooldown_seconds: 30,
            block_duration_seconds: 24 * 3600,
        }
    }

    pub fn sso() -> Self {
        Self {
            enabled: true,
            account_limit_per_hour: 20,
            account_limit_per_day: 50,
            phone_limit_per_hour: 0,
            phone_limit_per_day: 0,
            ip_limit_per_hour: 50,
            ip_limit_per_day: 200,
            cooldown_seconds: 5,
            block_duration_seconds: 6 * 3600,
        }
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        check_hourly_vs_daily(
            "account_limit_per_day",
            self.account_limit_per_hour,
            self.account_limit_per_day,
        )?;
        check_hourly_vs_daily(
            "phone_limit_per_day",
            self.phone_limit_per_hour,
            self.phone_limit_per_day,
        )?;
        check_hourly_vs_daily(
            "ip_limit_per_day",
            self.ip_limit_per_hour,
            self.ip_limit_per_day,
        )?;
        if self.enabled && self.block_duration_seconds == 0 {
            return Err(ParamError::new(
                "block_duration_seconds",
                "must be positive when the channel is enabled",
            ));
        }
        Ok(())
    }
}

/// A non-zero daily cap below the hourly cap is contradictory.
fn check_hourly_vs_daily(field: &'static str, hourly: u32, daily: u32) -> Result<(), ParamError> {
    if hourly > 0 && daily > 0 && daily < hourly {
        return Err(ParamError::new(
            field,
            format!("daily limit {daily} is below hourly limit {hourly}"),
        ));
    }
    Ok(())
}

impl Default for ChannelRateLimitConfig {
    fn default() -> Self {
        Self::sms()
    }
}

/// Network-wide request ceiling across every entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalRateLimitConfig {
    pub enabled: bool,
    pub limit_per_minute: u32,
}

impl GlobalRateLimitConfig {
    pub fn defaults() -> Self {
        Self {
            enabled: true,
            limit_per_minute: 1000,
        }
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        if self.enabled && self.limit_per_minute == 0 {
            return Err(ParamError::new(
                "limit_per_minute",
                "must be positive when the global limit is enabled",
            ));
        }
        Ok(())
    }
}

impl Default for GlobalRateLimitConfig {
    fn default() -> Self {
        Self::defaults()
    }
}
