//! Combined evaluation of every dimension a channel request touches.

use serde::{Deserialize, Serialize};
use trustgate_types::Timestamp;

use crate::error::RateLimitError;
use crate::limiter::{RateLimitCheck, RateLimiter};
use crate::state::{EntityKind, GlobalRateLimitState, RateLimitState};

/// The counter states one channel request is evaluated against.
///
/// Phone and IP are optional: an SSO redirect has no phone number, and a
/// request relayed by a validator may carry no client IP.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub account: RateLimitState,
    pub phone: Option<RateLimitState>,
    pub ip: Option<RateLimitState>,
    pub global: GlobalRateLimitState,
}

impl ChannelSnapshot {
    pub fn new(account: RateLimitState, global: GlobalRateLimitState) -> Self {
        Self {
            account,
            phone: None,
            ip: None,
            global,
        }
    }

    pub fn with_phone(mut self, phone: RateLimitState) -> Self {
        self.phone = Some(phone);
        self
    }

    pub fn with_ip(mut self, ip: RateLimitState) -> Self {
        self.ip = Some(ip);
        self
    }

    fn validate(&self) -> Result<(), RateLimitError> {
        expect_kind(&self.account, EntityKind::Account)?;
        if let Some(phone) = &self.phone {
            expect_kind(phone, EntityKind::Phone)?;
        }
        if let Some(ip) = &self.ip {
            expect_kind(ip, EntityKind::Ip)?;
        }
        Ok(())
    }
}

fn expect_kind(state: &RateLimitState, expected: EntityKind) -> Result<(), RateLimitError> {
    if state.entity_kind != expected {
        return Err(RateLimitError::EntityMismatch {
            expected,
            actual: state.entity_kind,
        });
    }
    Ok(())
}

impl RateLimiter {
    /// Evaluate account, phone, IP and global limits in that order; the first
    /// denial wins. An allowed result reports the account's remaining quota.
    pub fn check_channel(
        &self,
        snapshot: &ChannelSnapshot,
        now: Timestamp,
    ) -> Result<RateLimitCheck, RateLimitError> {
        snapshot.validate()?;
        let account = self.check(&snapshot.account, now);
        if !account.allowed {
            return Ok(account);
        }
        for state in snapshot.phone.iter().chain(snapshot.ip.iter()) {
            let check = self.check(state, now);
            if !check.allowed {
                return Ok(check);
            }
        }
        let global = self.check_global(&snapshot.global, now);
        if !global.allowed {
            return Ok(global);
        }
        Ok(account)
    }

    /// Check every dimension and, only if all allow, record the request in each.
    pub fn check_and_record_channel(
        &self,
        snapshot: ChannelSnapshot,
        now: Timestamp,
    ) -> Result<(RateLimitCheck, ChannelSnapshot), RateLimitError> {
        let check = self.check_channel(&snapshot, now)?;
        if !check.allowed {
            tracing::warn!(
                limit_type = ?check.limit_type,
                denial = ?check.denial,
                retry_after = check.retry_after_secs,
                "channel request denied"
            );
            return Ok((check, snapshot));
        }
        let ChannelSnapshot {
            account,
            phone,
            ip,
            global,
        } = snapshot;
        let (account_check, account) = self.check_and_record(account, now);
        let recorded = ChannelSnapshot {
            account,
            phone: phone.map(|s| self.record(s, now)),
            ip: ip.map(|s| self.record(s, now)),
            global: self.record_global(global, now),
        };
        Ok((account_check, recorded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::{Denial, LimitType};
    use trustgate_types::{AccountAddress, ChannelRateLimitConfig, GlobalRateLimitConfig};

    fn limiter() -> RateLimiter {
        RateLimiter::new(
            ChannelRateLimitConfig::sms(),
            GlobalRateLimitConfig::defaults(),
        )
        .unwrap()
    }

    fn snapshot() -> ChannelSnapshot {
        ChannelSnapshot::new(
            RateLimitState::for_account(&AccountAddress::new("acct_1")),
            GlobalRateLimitState::new(),
        )
        .with_phone(RateLimitState::for_phone("+15550100000"))
        .with_ip(RateLimitState::for_ip("203.0.113.9"))
    }

    #[test]
    fn allowed_request_records_every_dimension() {
        let rl = limiter();
        let (check, after) = rl
            .check_and_record_channel(snapshot(), Timestamp::new(10_000))
            .unwrap();
        assert!(check.allowed);
        assert_eq!(after.account.total_requests, 1);
        assert_eq!(after.phone.as_ref().unwrap().total_requests, 1);
        assert_eq!(after.ip.as_ref().unwrap().total_requests, 1);
        assert_eq!(after.global.total_requests, 1);
    }

    #[test]
    fn phone_denial_blocks_whole_request() {
        let rl = limiter();
        let mut snap = snapshot();
        snap.phone = snap
            .phone
            .map(|p| rl.block(p, Timestamp::new(9_000), Some(3600), "sim swap"));
        let (check, after) = rl
            .check_and_record_channel(snap.clone(), Timestamp::new(10_000))
            .unwrap();
        assert!(!check.allowed);
        assert_eq!(check.limit_type, Some(LimitType::Phone));
        assert_eq!(check.denial, Some(Denial::Blocked));
        assert_eq!(after, snap);
    }

    #[test]
    fn misplaced_state_rejected() {
        let rl = limiter();
        let mut snap = snapshot();
        snap.ip = Some(RateLimitState::for_phone("+15550100000"));
        let err = rl.check_channel(&snap, Timestamp::new(1)).unwrap_err();
        assert!(matches!(
            err,
            RateLimitError::EntityMismatch {
                expected: EntityKind::Ip,
                actual: EntityKind::Phone
            }
        ));
    }
}
