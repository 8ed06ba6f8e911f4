//! Borderline decision engine and multi-factor fallback lifecycle.
//!
//! A confidence score is classified against the half-open band
//! `[lower_threshold, upper_threshold)`: below it is rejected, at or above the
//! upper threshold is verified, and inside it escalates to a secondary factor.
//! Each escalation is tracked by one [`FallbackRecord`] backed by a challenge.
//! Records are monotonic: once terminal, every further mutation is an error.

use serde::{Deserialize, Serialize};
use trustgate_crypto::{derive_id, DerivationInput};
use trustgate_ratelimit::{ChannelSnapshot, RateLimiter};
use trustgate_types::{
    AccountAddress, BlockHeight, BlockSeed, BorderlineParams, FactorKind, Timestamp,
    VerificationStatus, MAX_SCORE,
};

use crate::challenge::{Challenge, ChallengeRegistry, NonceSet};
use crate::error::VerificationError;

/// Classification of a confidence score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Reject,
    Verify,
    Escalate,
}

/// Classify `score` against the band. Pure; assumes `params` validated.
pub fn classify(params: &BorderlineParams, score: u32) -> Decision {
    if score < params.lower_threshold {
        Decision::Reject
    } else if score >= params.upper_threshold {
        Decision::Verify
    } else {
        Decision::Escalate
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FallbackStatus {
    Pending,
    Completed,
    Failed,
    Expired,
    Cancelled,
}

impl FallbackStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One escalation attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackRecord {
    pub fallback_id: String,
    pub account_address: AccountAddress,
    pub borderline_score: u32,
    /// The challenge opened with the record.
    pub challenge_id: String,
    /// Every challenge issued for the record, the opening one first.
    pub issued_challenges: Vec<String>,
    pub status: FallbackStatus,
    pub required_factors: Vec<FactorKind>,
    pub satisfied_factors: Vec<FactorKind>,
    /// Factors still required after deduplication; how many of them must be met.
    pub min_factors_satisfied: u32,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub block_height: BlockHeight,
    pub final_verification_status: Option<VerificationStatus>,
    pub close_reason: Option<String>,
}

impl FallbackRecord {
    /// Distinct required factors already satisfied.
    pub fn satisfied_count(&self) -> u32 {
        let mut required = self.required_factors.clone();
        required.sort();
        required.dedup();
        required
            .iter()
            .filter(|f| self.satisfied_factors.contains(f))
            .count() as u32
    }

    /// Required factors not yet satisfied.
    pub fn missing_factors(&self) -> Vec<FactorKind> {
        let mut missing: Vec<FactorKind> = self
            .required_factors
            .iter()
            .filter(|f| !self.satisfied_factors.contains(f))
            .copied()
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }

    pub fn issued(&self, challenge_id: &str) -> bool {
        self.issued_challenges.iter().any(|id| id == challenge_id)
    }

    fn next_challenge_subject(&self) -> String {
        format!("{}/{}", self.fallback_id, self.issued_challenges.len())
    }

    fn record_challenge(&mut self, challenge: &Challenge) {
        if self.issued_challenges.is_empty() {
            self.challenge_id = challenge.challenge_id.clone();
        }
        self.issued_challenges.push(challenge.challenge_id.clone());
    }

    /// The status the parent scope should carry while this record stands.
    pub fn projected_status(&self) -> VerificationStatus {
        match self.status {
            FallbackStatus::Pending => VerificationStatus::AdditionalFactorPending,
            FallbackStatus::Completed => VerificationStatus::Verified,
            FallbackStatus::Failed | FallbackStatus::Cancelled => VerificationStatus::Rejected,
            FallbackStatus::Expired => VerificationStatus::Expired,
        }
    }
}

/// Result of advancing a fallback record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackOutcome {
    Completed,
    /// Not enough factors yet; the record stays `Pending`.
    AwaitingFactors {
        missing: Vec<FactorKind>,
        still_needed: u32,
    },
    Failed,
    Expired,
    Cancelled,
}

/// Decides escalations and drives fallback records.
#[derive(Clone, Debug)]
pub struct BorderlineEngine {
    params: BorderlineParams,
    registry: ChallengeRegistry,
}

impl BorderlineEngine {
    pub fn new(
        params: BorderlineParams,
        registry: ChallengeRegistry,
    ) -> Result<Self, VerificationError> {
        params.validate()?;
        if params.enabled && params.challenge_timeout_secs > registry.params().max_ttl_secs {
            return Err(VerificationError::InvalidParameter(format!(
                "challenge_timeout_secs {} exceeds challenge max_ttl_secs {}",
                params.challenge_timeout_secs,
                registry.params().max_ttl_secs
            )));
        }
        Ok(Self { params, registry })
    }

    pub fn params(&self) -> &BorderlineParams {
        &self.params
    }

    pub fn registry(&self) -> &ChallengeRegistry {
        &self.registry
    }

    /// Classify a score, rejecting scores outside `0..=100`.
    pub fn classify(&self, score: u32) -> Result<Decision, VerificationError> {
        if score > MAX_SCORE {
            return Err(VerificationError::InvalidParameter(format!(
                "score {score} exceeds {MAX_SCORE}"
            )));
        }
        Ok(classify(&self.params, score))
    }

    /// Open a `Pending` fallback for an in-band score, with its backing challenge.
    ///
    /// The challenge uses the first required factor and shares the record's
    /// deadline. `subject` identifies the escalation (its request and attempt)
    /// and must not repeat for one account within a block.
    #[allow(clippy::too_many_arguments)]
    pub fn open_fallback(
        &self,
        account: &AccountAddress,
        subject: &str,
        score: u32,
        now: Timestamp,
        block_height: BlockHeight,
        seed: &BlockSeed,
    ) -> Result<(FallbackRecord, Challenge), VerificationError> {
        let method = self.escalation_method(score)?;
        let mut record = self.new_record(account, subject, score, now, block_height, seed);
        let challenge = self.registry.issue(
            account,
            method,
            &record.next_challenge_subject(),
            now,
            self.params.challenge_timeout_secs as i64,
            seed,
        )?;
        record.record_challenge(&challenge);
        log_opened(&record);
        Ok((record, challenge))
    }

    /// As [`open_fallback`](Self::open_fallback), gated by the channel rate limiter.
    #[allow(clippy::too_many_arguments)]
    pub fn open_fallback_gated(
        &self,
        limiter: &RateLimiter,
        snapshot: ChannelSnapshot,
        account: &AccountAddress,
        subject: &str,
        score: u32,
        now: Timestamp,
        block_height: BlockHeight,
        seed: &BlockSeed,
    ) -> Result<(FallbackRecord, Challenge, ChannelSnapshot), VerificationError> {
        let method = self.escalation_method(score)?;
        let mut record = self.new_record(account, subject, score, now, block_height, seed);
        let (challenge, snapshot) = self.registry.issue_gated(
            limiter,
            snapshot,
            account,
            method,
            &record.next_challenge_subject(),
            now,
            self.params.challenge_timeout_secs as i64,
            seed,
        )?;
        record.record_challenge(&challenge);
        log_opened(&record);
        Ok((record, challenge, snapshot))
    }

    fn escalation_method(&self, score: u32) -> Result<FactorKind, VerificationError> {
        if !self.params.enabled {
            return Err(VerificationError::InvalidParameter(
                "borderline escalation is disabled".into(),
            ));
        }
        if self.classify(score)? != Decision::Escalate {
            return Err(VerificationError::InvalidParameter(format!(
                "score {score} is outside the borderline band [{}, {})",
                self.params.lower_threshold, self.params.upper_threshold
            )));
        }
        self.params
            .required_factors
            .first()
            .copied()
            .ok_or_else(|| VerificationError::InvalidParameter("no required factors".into()))
    }

    fn new_record(
        &self,
        account: &AccountAddress,
        subject: &str,
        score: u32,
        now: Timestamp,
        block_height: BlockHeight,
        seed: &BlockSeed,
    ) -> FallbackRecord {
        let height = block_height.to_be_bytes();
        let input = DerivationInput::new()
            .with_str(account.as_str())
            .with_str(subject)
            .with(&height);
        FallbackRecord {
            fallback_id: derive_id("fallback", seed, &input),
            account_address: account.clone(),
            borderline_score: score,
            challenge_id: String::new(),
            issued_challenges: Vec::new(),
            status: FallbackStatus::Pending,
            required_factors: self.params.required_factors.clone(),
            satisfied_factors: Vec::new(),
            min_factors_satisfied: self.params.min_factors_satisfied,
            created_at: now,
            expires_at: now.plus_secs(self.params.challenge_timeout_secs),
            completed_at: None,
            block_height,
            final_verification_status: None,
            close_reason: None,
        }
    }

    /// Issue a further challenge for a still-missing factor of a pending record.
    ///
    /// The challenge never outlives the record and is bound to it: only
    /// challenges the record issued can resolve it.
    pub fn issue_factor_challenge(
        &self,
        record: &mut FallbackRecord,
        method: FactorKind,
        now: Timestamp,
        seed: &BlockSeed,
    ) -> Result<Challenge, VerificationError> {
        ensure_pending(record)?;
        if record.is_expired(now) {
            return Err(VerificationError::Expired {
                id: record.fallback_id.clone(),
                expired_at: record.expires_at,
            });
        }
        if !record.missing_factors().contains(&method) {
            return Err(VerificationError::InvalidParameter(format!(
                "factor {method} is not outstanding for fallback {}",
                record.fallback_id
            )));
        }
        let remaining = record.expires_at.secs_until(now).max(1);
        let challenge = self.registry.issue(
            &record.account_address,
            method,
            &record.next_challenge_subject(),
            now,
            remaining as i64,
            seed,
        )?;
        record.record_challenge(&challenge);
        Ok(challenge)
    }

    /// Count `satisfied` factors towards the record and settle it if enough are met.
    ///
    /// A record past its deadline is expired instead. Factors outside the
    /// required set are kept for audit but never counted.
    pub fn resolve(
        &self,
        record: &mut FallbackRecord,
        satisfied: &[FactorKind],
        now: Timestamp,
    ) -> Result<FallbackOutcome, VerificationError> {
        ensure_pending(record)?;
        if self.expire_if_due(record, now) {
            return Ok(FallbackOutcome::Expired);
        }

        for factor in satisfied {
            if !record.satisfied_factors.contains(factor) {
                record.satisfied_factors.push(*factor);
            }
        }

        let count = record.satisfied_count();
        if count >= record.min_factors_satisfied {
            record.status = FallbackStatus::Completed;
            record.completed_at = Some(now);
            record.final_verification_status = Some(VerificationStatus::Verified);
            tracing::info!(
                fallback_id = %record.fallback_id,
                satisfied = count,
                "fallback completed"
            );
            return Ok(FallbackOutcome::Completed);
        }

        Ok(FallbackOutcome::AwaitingFactors {
            missing: record.missing_factors(),
            still_needed: record.min_factors_satisfied - count,
        })
    }

    /// Complete `challenge` with the presented nonce and count its method as satisfied.
    pub fn resolve_with_challenge<N: NonceSet + ?Sized>(
        &self,
        record: &mut FallbackRecord,
        challenge: &mut Challenge,
        presented_nonce: &str,
        used: &mut N,
        now: Timestamp,
    ) -> Result<FallbackOutcome, VerificationError> {
        ensure_pending(record)?;
        if challenge.account_address != record.account_address
            || !record.issued(&challenge.challenge_id)
        {
            return Err(VerificationError::InvalidParameter(format!(
                "challenge {} was not issued for fallback {}",
                challenge.challenge_id, record.fallback_id
            )));
        }
        if self.expire_if_due(record, now) {
            self.registry.expire_if_due(challenge, now);
            return Ok(FallbackOutcome::Expired);
        }
        self.registry
            .complete(challenge, presented_nonce, used, now)?;
        self.resolve(record, &[challenge.method], now)
    }

    /// Record an explicit failure.
    pub fn mark_failed(
        &self,
        record: &mut FallbackRecord,
        reason: &str,
        now: Timestamp,
    ) -> Result<FallbackOutcome, VerificationError> {
        self.close(record, FallbackStatus::Failed, VerificationStatus::Rejected, reason, now)?;
        Ok(FallbackOutcome::Failed)
    }

    /// Caller-initiated abort.
    pub fn mark_cancelled(
        &self,
        record: &mut FallbackRecord,
        reason: &str,
        now: Timestamp,
    ) -> Result<FallbackOutcome, VerificationError> {
        self.close(record, FallbackStatus::Cancelled, VerificationStatus::Rejected, reason, now)?;
        Ok(FallbackOutcome::Cancelled)
    }

    /// Expire a pending record whose deadline has passed. Returns whether it changed.
    pub fn expire_if_due(&self, record: &mut FallbackRecord, now: Timestamp) -> bool {
        if record.status != FallbackStatus::Pending || !record.is_expired(now) {
            return false;
        }
        record.status = FallbackStatus::Expired;
        record.completed_at = Some(now);
        record.final_verification_status = Some(VerificationStatus::Expired);
        record.close_reason = Some("challenge_timeout".into());
        tracing::info!(fallback_id = %record.fallback_id, "fallback expired");
        true
    }

    /// Externally triggered sweep; returns the ids of records it expired.
    pub fn sweep_expired(&self, records: &mut [FallbackRecord], now: Timestamp) -> Vec<String> {
        records
            .iter_mut()
            .filter_map(|r| self.expire_if_due(r, now).then(|| r.fallback_id.clone()))
            .collect()
    }

    fn close(
        &self,
        record: &mut FallbackRecord,
        status: FallbackStatus,
        final_status: VerificationStatus,
        reason: &str,
        now: Timestamp,
    ) -> Result<(), VerificationError> {
        ensure_pending(record)?;
        record.status = status;
        record.completed_at = Some(now);
        record.final_verification_status = Some(final_status);
        record.close_reason = Some(reason.to_string());
        tracing::info!(fallback_id = %record.fallback_id, ?status, reason, "fallback closed");
        Ok(())
    }
}

fn log_opened(record: &FallbackRecord) {
    tracing::info!(
        fallback_id = %record.fallback_id,
        account = %record.account_address,
        score = record.borderline_score,
        challenge_id = %record.challenge_id,
        expires_at = %record.expires_at,
        "borderline score escalated"
    );
}

fn ensure_pending(record: &FallbackRecord) -> Result<(), VerificationError> {
    if record.status.is_terminal() {
        return Err(VerificationError::already_terminal(
            &record.fallback_id,
            record.status,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::ChallengeStatus;
    use std::collections::BTreeSet;
    use trustgate_types::{ChallengeParams, ErrorKind};

    fn params() -> BorderlineParams {
        BorderlineParams {
            lower_threshold: 60,
            upper_threshold: 85,
            enabled: true,
            required_factors: vec![FactorKind::Sms, FactorKind::Email],
            challenge_timeout_secs: 600,
            min_factors_satisfied: 1,
        }
    }

    fn engine_with(params: BorderlineParams) -> BorderlineEngine {
        BorderlineEngine::new(
            params,
            ChallengeRegistry::new(ChallengeParams::defaults()).unwrap(),
        )
        .unwrap()
    }

    fn engine() -> BorderlineEngine {
        engine_with(params())
    }

    fn acct() -> AccountAddress {
        AccountAddress::new("acct_1")
    }

    fn seed() -> BlockSeed {
        BlockSeed::new([3; 32])
    }

    fn open(engine: &BorderlineEngine) -> (FallbackRecord, Challenge) {
        engine
            .open_fallback(&acct(), "req_1/0", 70, Timestamp::new(1000), 12, &seed())
            .unwrap()
    }

    #[test]
    fn band_edges() {
        let p = params();
        assert_eq!(classify(&p, 59), Decision::Reject);
        assert_eq!(classify(&p, 60), Decision::Escalate);
        assert_eq!(classify(&p, 84), Decision::Escalate);
        assert_eq!(classify(&p, 85), Decision::Verify);
    }

    #[test]
    fn score_above_max_rejected() {
        assert_eq!(
            engine().classify(101).unwrap_err().kind(),
            ErrorKind::InvalidParameter
        );
    }

    #[test]
    fn timeout_longer_than_challenge_max_rejected() {
        let registry = ChallengeRegistry::new(ChallengeParams {
            default_ttl_secs: 60,
            max_ttl_secs: 120,
        })
        .unwrap();
        assert!(BorderlineEngine::new(params(), registry).is_err());
    }

    #[test]
    fn open_fallback_shares_deadline_with_challenge() {
        let (record, challenge) = open(&engine());
        assert_eq!(record.status, FallbackStatus::Pending);
        assert_eq!(record.expires_at, Timestamp::new(1600));
        assert_eq!(challenge.expires_at, record.expires_at);
        assert_eq!(challenge.method, FactorKind::Sms);
        assert_eq!(record.challenge_id, challenge.challenge_id);
        assert_eq!(record.issued_challenges, vec![challenge.challenge_id.clone()]);
        assert_eq!(record.block_height, 12);
        assert!(record.expires_at > record.created_at);
    }

    #[test]
    fn open_fallback_outside_band_rejected() {
        let e = engine();
        for score in [10, 90] {
            let err = e
                .open_fallback(&acct(), "req_1/0", score, Timestamp::new(1), 1, &seed())
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        }
    }

    #[test]
    fn disabled_escalation_cannot_open() {
        let e = engine_with(BorderlineParams {
            enabled: false,
            ..params()
        });
        assert!(e
            .open_fallback(&acct(), "req_1/0", 70, Timestamp::new(1), 1, &seed())
            .is_err());
    }

    #[test]
    fn one_factor_completes() {
        let e = engine();
        let (mut record, _) = open(&e);
        let outcome = e
            .resolve(&mut record, &[FactorKind::Email], Timestamp::new(1100))
            .unwrap();
        assert_eq!(outcome, FallbackOutcome::Completed);
        assert_eq!(record.status, FallbackStatus::Completed);
        assert_eq!(
            record.final_verification_status,
            Some(VerificationStatus::Verified)
        );
    }

    #[test]
    fn unrequired_factors_do_not_count() {
        let e = engine();
        let (mut record, _) = open(&e);
        let outcome = e
            .resolve(&mut record, &[FactorKind::Domain], Timestamp::new(1100))
            .unwrap();
        assert_eq!(
            outcome,
            FallbackOutcome::AwaitingFactors {
                missing: vec![FactorKind::Sms, FactorKind::Email],
                still_needed: 1
            }
        );
        assert_eq!(record.status, FallbackStatus::Pending);
    }

    #[test]
    fn factors_accumulate_across_calls() {
        let e = engine_with(BorderlineParams {
            min_factors_satisfied: 2,
            ..params()
        });
        let (mut record, _) = open(&e);
        let first = e
            .resolve(&mut record, &[FactorKind::Sms, FactorKind::Sms], Timestamp::new(1100))
            .unwrap();
        assert_eq!(
            first,
            FallbackOutcome::AwaitingFactors {
                missing: vec![FactorKind::Email],
                still_needed: 1
            }
        );
        let second = e
            .resolve(&mut record, &[FactorKind::Email], Timestamp::new(1200))
            .unwrap();
        assert_eq!(second, FallbackOutcome::Completed);
        assert_eq!(record.satisfied_factors, vec![FactorKind::Sms, FactorKind::Email]);
    }

    #[test]
    fn late_resolution_expires() {
        let e = engine();
        let (mut record, _) = open(&e);
        let outcome = e
            .resolve(&mut record, &[FactorKind::Sms], Timestamp::new(1601))
            .unwrap();
        assert_eq!(outcome, FallbackOutcome::Expired);
        assert_eq!(record.status, FallbackStatus::Expired);
        assert_eq!(record.projected_status(), VerificationStatus::Expired);
    }

    #[test]
    fn terminal_records_reject_every_mutation() {
        let e = engine();
        for close in 0..4 {
            let (mut record, _) = open(&e);
            match close {
                0 => {
                    e.resolve(&mut record, &[FactorKind::Sms], Timestamp::new(1001))
                        .unwrap();
                }
                1 => {
                    e.mark_failed(&mut record, "proof rejected", Timestamp::new(1001))
                        .unwrap();
                }
                2 => {
                    e.mark_cancelled(&mut record, "user abort", Timestamp::new(1001))
                        .unwrap();
                }
                _ => assert!(e.expire_if_due(&mut record, Timestamp::new(5000))),
            }
            let before = record.clone();
            let now = Timestamp::new(1002);
            for err in [
                e.resolve(&mut record, &[FactorKind::Sms], now).unwrap_err(),
                e.mark_failed(&mut record, "x", now).unwrap_err(),
                e.mark_cancelled(&mut record, "x", now).unwrap_err(),
            ] {
                assert_eq!(err.kind(), ErrorKind::AlreadyTerminal);
            }
            assert_eq!(record, before);
        }
    }

    #[test]
    fn resolve_with_challenge_counts_method() {
        let e = engine();
        let (mut record, mut challenge) = open(&e);
        let nonce = challenge.nonce.clone();
        let mut used = BTreeSet::new();
        let outcome = e
            .resolve_with_challenge(&mut record, &mut challenge, &nonce, &mut used, Timestamp::new(1010))
            .unwrap();
        assert_eq!(outcome, FallbackOutcome::Completed);
        assert_eq!(record.satisfied_factors, vec![FactorKind::Sms]);
    }

    #[test]
    fn wrong_nonce_leaves_record_pending() {
        let e = engine();
        let (mut record, mut challenge) = open(&e);
        let err = e
            .resolve_with_challenge(
                &mut record,
                &mut challenge,
                "bogus",
                &mut BTreeSet::new(),
                Timestamp::new(1010),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NonceMismatch);
        assert_eq!(record.status, FallbackStatus::Pending);
    }

    #[test]
    fn factor_challenge_never_outlives_record() {
        let e = engine_with(BorderlineParams {
            min_factors_satisfied: 2,
            ..params()
        });
        let (mut record, _) = open(&e);
        let email = e
            .issue_factor_challenge(&mut record, FactorKind::Email, Timestamp::new(1500), &seed())
            .unwrap();
        assert_eq!(email.expires_at, record.expires_at);
        assert_eq!(record.issued_challenges.len(), 2);
        assert!(record.issued(&email.challenge_id));

        let err = e
            .issue_factor_challenge(&mut record, FactorKind::Domain, Timestamp::new(1500), &seed())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn challenge_from_another_fallback_is_refused() {
        let e = engine();
        let (mut first, _) = open(&e);
        let (_, mut foreign) = e
            .open_fallback(&acct(), "req_2/0", 70, Timestamp::new(1000), 12, &seed())
            .unwrap();
        let nonce = foreign.nonce.clone();
        let mut used = BTreeSet::new();
        let err = e
            .resolve_with_challenge(&mut first, &mut foreign, &nonce, &mut used, Timestamp::new(1010))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert_eq!(first.status, FallbackStatus::Pending);
        assert!(first.satisfied_factors.is_empty());
        assert_eq!(foreign.status, ChallengeStatus::Pending);
        assert!(used.is_empty());
    }

    #[test]
    fn same_block_escalations_are_distinct() {
        let e = engine();
        let (a, ca) = open(&e);
        let (b, cb) = e
            .open_fallback(&acct(), "req_2/0", 70, Timestamp::new(1000), 12, &seed())
            .unwrap();
        assert_ne!(a.fallback_id, b.fallback_id);
        assert_ne!(ca.challenge_id, cb.challenge_id);
        assert_ne!(ca.nonce, cb.nonce);
    }

    #[test]
    fn sweep_expires_only_due_records() {
        let e = engine();
        let (a, _) = open(&e);
        let (b, _) = e
            .open_fallback(&acct(), "req_2/0", 70, Timestamp::new(2000), 13, &seed())
            .unwrap();
        let mut records = vec![a, b];
        let expired = e.sweep_expired(&mut records, Timestamp::new(1700));
        assert_eq!(expired, vec![records[0].fallback_id.clone()]);
        assert_eq!(records[1].status, FallbackStatus::Pending);
    }
}
