//! Challenge registry: expiring, nonce-bound out-of-band challenges.
//!
//! SMS OTPs, email links, SSO and AD-SSO linkage, and domain-ownership proofs
//! are all instances of the same [`Challenge`], distinguished only by their
//! [`FactorKind`]. Nonces are single-use: a consumed nonce's hash enters the
//! caller's used-nonce set and any second presentation fails closed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use trustgate_crypto::{derive_id, derive_nonce, hash_nonce, DerivationInput};
use trustgate_ratelimit::{ChannelSnapshot, RateLimiter};
use trustgate_types::{AccountAddress, BlockSeed, ChallengeParams, FactorKind, Hash256, Timestamp};

use crate::error::VerificationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChallengeStatus {
    Pending,
    Verified,
    Failed,
    Revoked,
    Expired,
}

impl ChallengeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// An outstanding out-of-band proof request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: String,
    pub account_address: AccountAddress,
    pub method: FactorKind,
    /// Delivered to the account out of band; the caller must not echo it back in events.
    pub nonce: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub status: ChallengeStatus,
    pub completed_at: Option<Timestamp>,
    pub revoke_reason: Option<String>,
}

impl Challenge {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }
}

/// The caller-owned set of consumed nonce hashes.
pub trait NonceSet {
    fn is_used(&self, nonce_hash: &Hash256) -> Result<bool, VerificationError>;
    fn mark_used(&mut self, nonce_hash: Hash256) -> Result<(), VerificationError>;
}

impl NonceSet for BTreeSet<Hash256> {
    fn is_used(&self, nonce_hash: &Hash256) -> Result<bool, VerificationError> {
        Ok(self.contains(nonce_hash))
    }

    fn mark_used(&mut self, nonce_hash: Hash256) -> Result<(), VerificationError> {
        self.insert(nonce_hash);
        Ok(())
    }
}

impl NonceSet for HashSet<Hash256> {
    fn is_used(&self, nonce_hash: &Hash256) -> Result<bool, VerificationError> {
        Ok(self.contains(nonce_hash))
    }

    fn mark_used(&mut self, nonce_hash: Hash256) -> Result<(), VerificationError> {
        self.insert(nonce_hash);
        Ok(())
    }
}

/// Issues and settles challenges under one lifetime policy.
#[derive(Clone, Debug)]
pub struct ChallengeRegistry {
    params: ChallengeParams,
}

impl ChallengeRegistry {
    pub fn new(params: ChallengeParams) -> Result<Self, VerificationError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &ChallengeParams {
        &self.params
    }

    /// Issue a `Pending` challenge expiring at `now + ttl`.
    ///
    /// A non-positive `ttl_secs` selects the default TTL. The id and nonce are
    /// derived from `seed` (the executing block's entropy), the account, the
    /// method, `subject` and `now`. `subject` names what the challenge belongs
    /// to and must be unique per issuance within a block.
    pub fn issue(
        &self,
        account: &AccountAddress,
        method: FactorKind,
        subject: &str,
        now: Timestamp,
        ttl_secs: i64,
        seed: &BlockSeed,
    ) -> Result<Challenge, VerificationError> {
        if !account.is_valid() {
            return Err(VerificationError::InvalidParameter(format!(
                "invalid account address {account:?}"
            )));
        }
        let ttl = if ttl_secs <= 0 {
            self.params.default_ttl_secs
        } else {
            ttl_secs as u64
        };
        if ttl > self.params.max_ttl_secs {
            return Err(VerificationError::InvalidParameter(format!(
                "challenge ttl {ttl}s exceeds maximum {}s",
                self.params.max_ttl_secs
            )));
        }

        let ts = now.to_be_bytes();
        let input = DerivationInput::new()
            .with_str(account.as_str())
            .with_str(method.as_str())
            .with_str(subject)
            .with(&ts);
        let challenge = Challenge {
            challenge_id: derive_id("challenge", seed, &input),
            account_address: account.clone(),
            method,
            nonce: derive_nonce(seed, &input),
            created_at: now,
            expires_at: now.plus_secs(ttl),
            status: ChallengeStatus::Pending,
            completed_at: None,
            revoke_reason: None,
        };
        tracing::debug!(
            challenge_id = %challenge.challenge_id,
            account = %account,
            method = %method,
            expires_at = %challenge.expires_at,
            "challenge issued"
        );
        Ok(challenge)
    }

    /// Issue a challenge only if the channel's rate limiter allows it.
    ///
    /// On success the returned snapshot has the issuance recorded; on denial
    /// nothing is created and the snapshot is not advanced.
    #[allow(clippy::too_many_arguments)]
    pub fn issue_gated(
        &self,
        limiter: &RateLimiter,
        snapshot: ChannelSnapshot,
        account: &AccountAddress,
        method: FactorKind,
        subject: &str,
        now: Timestamp,
        ttl_secs: i64,
        seed: &BlockSeed,
    ) -> Result<(Challenge, ChannelSnapshot), VerificationError> {
        let check = limiter.check_channel(&snapshot, now)?;
        if !check.allowed {
            return Err(check.into());
        }
        let challenge = self.issue(account, method, subject, now, ttl_secs, seed)?;
        let (_, recorded) = limiter.check_and_record_channel(snapshot, now)?;
        Ok((challenge, recorded))
    }

    /// Settle a challenge with the presented nonce.
    ///
    /// Checks, in order: deadline, nonce match, replay, pending status. On
    /// success the challenge is `Verified` and its nonce hash is in `used`.
    pub fn complete<N: NonceSet + ?Sized>(
        &self,
        challenge: &mut Challenge,
        presented_nonce: &str,
        used: &mut N,
        now: Timestamp,
    ) -> Result<Hash256, VerificationError> {
        if challenge.is_expired(now) {
            if challenge.status == ChallengeStatus::Pending {
                challenge.status = ChallengeStatus::Expired;
            }
            return Err(VerificationError::Expired {
                id: challenge.challenge_id.clone(),
                expired_at: challenge.expires_at,
            });
        }

        let presented = hash_nonce(presented_nonce);
        if presented != hash_nonce(&challenge.nonce) {
            tracing::warn!(challenge_id = %challenge.challenge_id, "nonce mismatch");
            return Err(VerificationError::NonceMismatch(
                challenge.challenge_id.clone(),
            ));
        }
        if used.is_used(&presented)? {
            tracing::warn!(challenge_id = %challenge.challenge_id, "nonce replay rejected");
            return Err(VerificationError::NonceReplay(
                challenge.challenge_id.clone(),
            ));
        }
        if challenge.status != ChallengeStatus::Pending {
            return Err(VerificationError::already_terminal(
                &challenge.challenge_id,
                challenge.status,
            ));
        }

        used.mark_used(presented)?;
        challenge.status = ChallengeStatus::Verified;
        challenge.completed_at = Some(now);
        tracing::info!(
            challenge_id = %challenge.challenge_id,
            method = %challenge.method,
            "challenge verified"
        );
        Ok(presented)
    }

    /// Record an explicit failure reported by the upstream channel.
    pub fn fail(&self, challenge: &mut Challenge, now: Timestamp) -> Result<(), VerificationError> {
        self.settle(challenge, ChallengeStatus::Failed, now)
    }

    /// Withdraw a pending challenge.
    pub fn revoke(
        &self,
        challenge: &mut Challenge,
        reason: &str,
        now: Timestamp,
    ) -> Result<(), VerificationError> {
        self.settle(challenge, ChallengeStatus::Revoked, now)?;
        challenge.revoke_reason = Some(reason.to_string());
        Ok(())
    }

    /// Mark a pending challenge `Expired` if its deadline has passed.
    pub fn expire_if_due(&self, challenge: &mut Challenge, now: Timestamp) -> bool {
        if challenge.status == ChallengeStatus::Pending && challenge.is_expired(now) {
            challenge.status = ChallengeStatus::Expired;
            return true;
        }
        false
    }

    fn settle(
        &self,
        challenge: &mut Challenge,
        status: ChallengeStatus,
        now: Timestamp,
    ) -> Result<(), VerificationError> {
        if challenge.status.is_terminal() {
            return Err(VerificationError::already_terminal(
                &challenge.challenge_id,
                challenge.status,
            ));
        }
        challenge.status = status;
        challenge.completed_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustgate_ratelimit::{GlobalRateLimitState, RateLimitState};
    use trustgate_types::{ChannelRateLimitConfig, ErrorKind, GlobalRateLimitConfig};

    fn registry() -> ChallengeRegistry {
        ChallengeRegistry::new(ChallengeParams::defaults()).unwrap()
    }

    fn acct() -> AccountAddress {
        AccountAddress::new("acct_1")
    }

    fn seed() -> BlockSeed {
        BlockSeed::new([9; 32])
    }

    #[test]
    fn issue_uses_default_ttl_for_non_positive() {
        let reg = registry();
        let c = reg
            .issue(&acct(), FactorKind::Sms, "case_1", Timestamp::new(100), 0, &seed())
            .unwrap();
        assert_eq!(c.expires_at, Timestamp::new(100 + 300));
        let c = reg
            .issue(&acct(), FactorKind::Sms, "case_1", Timestamp::new(100), -5, &seed())
            .unwrap();
        assert_eq!(c.expires_at, Timestamp::new(100 + 300));
        assert_eq!(c.status, ChallengeStatus::Pending);
    }

    #[test]
    fn issue_rejects_ttl_over_maximum() {
        let err = registry()
            .issue(&acct(), FactorKind::Email, "case_1", Timestamp::new(1), 10 * 24 * 3600, &seed())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn nonces_differ_by_method_and_time() {
        let reg = registry();
        let a = reg.issue(&acct(), FactorKind::Sms, "case_1", Timestamp::new(1), 60, &seed()).unwrap();
        let b = reg.issue(&acct(), FactorKind::Email, "case_1", Timestamp::new(1), 60, &seed()).unwrap();
        let c = reg.issue(&acct(), FactorKind::Sms, "case_1", Timestamp::new(2), 60, &seed()).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.nonce, c.nonce);
        assert_ne!(a.challenge_id, b.challenge_id);
    }

    #[test]
    fn same_block_subjects_get_distinct_nonces() {
        let reg = registry();
        let mut used = BTreeSet::new();
        let now = Timestamp::new(10);
        let mut a = reg.issue(&acct(), FactorKind::Sms, "case_1", now, 60, &seed()).unwrap();
        let mut b = reg.issue(&acct(), FactorKind::Sms, "case_2", now, 60, &seed()).unwrap();
        assert_ne!(a.challenge_id, b.challenge_id);
        assert_ne!(a.nonce, b.nonce);

        let (na, nb) = (a.nonce.clone(), b.nonce.clone());
        reg.complete(&mut a, &na, &mut used, now).unwrap();
        reg.complete(&mut b, &nb, &mut used, now).unwrap();
        assert_eq!(used.len(), 2);
    }

    #[test]
    fn complete_then_replay() {
        let reg = registry();
        let mut used = BTreeSet::new();
        let mut c = reg.issue(&acct(), FactorKind::Sms, "case_1", Timestamp::new(10), 60, &seed()).unwrap();
        let nonce = c.nonce.clone();

        reg.complete(&mut c, &nonce, &mut used, Timestamp::new(20)).unwrap();
        assert_eq!(c.status, ChallengeStatus::Verified);
        assert_eq!(c.completed_at, Some(Timestamp::new(20)));
        assert_eq!(used.len(), 1);

        let err = reg.complete(&mut c, &nonce, &mut used, Timestamp::new(21)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NonceReplay);
    }

    #[test]
    fn wrong_nonce_is_mismatch() {
        let reg = registry();
        let mut used = BTreeSet::new();
        let mut c = reg.issue(&acct(), FactorKind::Sms, "case_1", Timestamp::new(10), 60, &seed()).unwrap();
        let err = reg.complete(&mut c, "000000", &mut used, Timestamp::new(20)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NonceMismatch);
        assert_eq!(c.status, ChallengeStatus::Pending);
        assert!(used.is_empty());
    }

    #[test]
    fn expiry_is_strictly_after_deadline() {
        let reg = registry();
        let mut used = HashSet::new();
        let mut c = reg.issue(&acct(), FactorKind::Sms, "case_1", Timestamp::new(10), 60, &seed()).unwrap();
        let nonce = c.nonce.clone();
        let mut late = c.clone();

        reg.complete(&mut c, &nonce, &mut used, Timestamp::new(70)).unwrap();

        let err = reg
            .complete(&mut late, &nonce, &mut HashSet::new(), Timestamp::new(71))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Expired);
        assert_eq!(late.status, ChallengeStatus::Expired);
    }

    #[test]
    fn revoked_challenge_cannot_complete() {
        let reg = registry();
        let mut c = reg.issue(&acct(), FactorKind::Sso, "case_1", Timestamp::new(10), 60, &seed()).unwrap();
        reg.revoke(&mut c, "user cancelled", Timestamp::new(11)).unwrap();
        assert_eq!(c.revoke_reason.as_deref(), Some("user cancelled"));

        let nonce = c.nonce.clone();
        let err = reg
            .complete(&mut c, &nonce, &mut BTreeSet::new(), Timestamp::new(12))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyTerminal);

        let err = reg.revoke(&mut c, "again", Timestamp::new(13)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyTerminal);
    }

    #[test]
    fn expire_if_due_only_touches_pending() {
        let reg = registry();
        let mut c = reg.issue(&acct(), FactorKind::Domain, "case_1", Timestamp::new(10), 60, &seed()).unwrap();
        assert!(!reg.expire_if_due(&mut c, Timestamp::new(70)));
        assert!(reg.expire_if_due(&mut c, Timestamp::new(71)));
        assert!(!reg.expire_if_due(&mut c, Timestamp::new(72)));
    }

    #[test]
    fn gated_issue_respects_cooldown() {
        let reg = registry();
        let limiter =
            RateLimiter::new(ChannelRateLimitConfig::sms(), GlobalRateLimitConfig::defaults())
                .unwrap();
        let snapshot = ChannelSnapshot::new(
            RateLimitState::for_account(&acct()),
            GlobalRateLimitState::new(),
        );

        let (_, snapshot) = reg
            .issue_gated(&limiter, snapshot, &acct(), FactorKind::Sms, "case_1", Timestamp::new(1000), 0, &seed())
            .unwrap();
        assert_eq!(snapshot.account.total_requests, 1);

        let err = reg
            .issue_gated(&limiter, snapshot, &acct(), FactorKind::Sms, "case_1", Timestamp::new(1030), 0, &seed())
            .unwrap_err();
        match err {
            VerificationError::RateLimited {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, 30),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }
}
