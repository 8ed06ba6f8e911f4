//! Coordinator tying the status machine, borderline engine, challenge
//! registry and request queue into one verification flow.
//!
//! The engine holds policy only. Every call receives the caller-owned
//! [`VerificationCase`], works on a copy and writes it back only on success,
//! so a failed call leaves the case exactly as it was. The emitted
//! [`VerificationEvent`]s are returned for the caller to persist or publish.

use serde::{Deserialize, Serialize};
use trustgate_ratelimit::{ChannelSnapshot, RateLimiter};
use trustgate_types::{
    AccountAddress, BlockHeight, BlockSeed, FactorKind, ScopeId, Timestamp, VerificationStatus,
};

use crate::borderline::{BorderlineEngine, Decision, FallbackOutcome, FallbackRecord};
use crate::challenge::{Challenge, ChallengeRegistry, ChallengeStatus, NonceSet};
use crate::config::EngineConfig;
use crate::error::VerificationError;
use crate::queue::{RequestQueue, RequestStatus, VerificationRequest, REASON_ATTEMPT_TIMEOUT};
use crate::status::{can_transition, EventContext, ScopeState, StatusMachine, VerificationEvent};

use VerificationStatus::*;

/// Caller-supplied execution context of one call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockContext {
    pub now: Timestamp,
    pub height: BlockHeight,
    pub seed: BlockSeed,
}

impl BlockContext {
    pub fn new(now: Timestamp, height: BlockHeight, seed: BlockSeed) -> Self {
        Self { now, height, seed }
    }
}

/// One request with its scopes and, while escalated, its fallback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCase {
    pub request: VerificationRequest,
    pub scopes: Vec<ScopeState>,
    pub fallback: Option<FallbackRecord>,
    /// The most recent challenge issued for the fallback.
    pub challenge: Option<Challenge>,
    /// Count of events emitted for this case.
    pub event_seq: u64,
}

impl VerificationCase {
    pub fn is_settled(&self) -> bool {
        self.request.is_final()
    }

    pub fn scope(&self, scope_id: &ScopeId) -> Option<&ScopeState> {
        self.scopes.iter().find(|s| &s.scope_id == scope_id)
    }

    fn pending_fallback(&self) -> Option<&FallbackRecord> {
        self.fallback.as_ref().filter(|f| !f.status.is_terminal())
    }
}

/// One rate limiter per out-of-band channel.
#[derive(Clone, Debug)]
pub struct ChannelLimiters {
    pub sms: RateLimiter,
    pub email: RateLimiter,
    pub sso: RateLimiter,
}

impl ChannelLimiters {
    pub fn from_config(config: &EngineConfig) -> Result<Self, VerificationError> {
        let build = |c| RateLimiter::new(c, config.global_rate_limit.clone());
        Ok(Self {
            sms: build(config.rate_limits.sms.clone())?,
            email: build(config.rate_limits.email.clone())?,
            sso: build(config.rate_limits.sso.clone())?,
        })
    }

    pub fn for_method(&self, method: FactorKind) -> &RateLimiter {
        match method {
            FactorKind::Sms => &self.sms,
            FactorKind::Email => &self.email,
            FactorKind::Sso | FactorKind::AdSso | FactorKind::Domain => &self.sso,
        }
    }
}

#[derive(Clone, Debug)]
pub struct VerificationEngine {
    machine: StatusMachine,
    borderline: BorderlineEngine,
    queue: RequestQueue,
    limiters: ChannelLimiters,
}

impl VerificationEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, VerificationError> {
        config
            .validate()
            .map_err(|e| VerificationError::InvalidParameter(e.to_string()))?;
        let registry = ChallengeRegistry::new(config.challenge.clone())?;
        Ok(Self {
            machine: StatusMachine,
            borderline: BorderlineEngine::new(config.borderline.clone(), registry)?,
            queue: RequestQueue::new(config.queue.clone())?,
            limiters: ChannelLimiters::from_config(config)?,
        })
    }

    pub fn borderline(&self) -> &BorderlineEngine {
        &self.borderline
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub fn limiters(&self) -> &ChannelLimiters {
        &self.limiters
    }

    /// Open a case. Its scopes start `Pending`; a request rejected on
    /// submission carries no scopes and emits nothing.
    ///
    /// `known` holds the account's persisted scope states. A claimed scope
    /// starts from its known status: `Unknown`, `Rejected` and `Expired` reopen,
    /// a scope another request still drives is `ScopeBusy`, and a `Verified`
    /// scope must expire before it can be claimed again.
    pub fn submit(
        &self,
        account: &AccountAddress,
        scope_ids: Vec<ScopeId>,
        priority: u32,
        known: &[ScopeState],
        block: &BlockContext,
    ) -> Result<(VerificationCase, Vec<VerificationEvent>), VerificationError> {
        let request = self.queue.submit(
            account,
            scope_ids,
            priority,
            block.now,
            block.height,
            &block.seed,
        )?;
        let mut scopes = Vec::new();
        if request.status != RequestStatus::Rejected {
            for id in &request.scope_ids {
                let mut scope = known
                    .iter()
                    .find(|s| &s.account == account && &s.scope_id == id)
                    .cloned()
                    .unwrap_or_else(|| ScopeState::new(account.clone(), id.clone()));
                claim(&mut scope, &request.request_id)?;
                scopes.push(scope);
            }
        }
        let mut case = VerificationCase {
            request,
            scopes,
            fallback: None,
            challenge: None,
            event_seq: 0,
        };
        let mut events = Vec::new();
        self.advance_scopes(
            &mut case,
            &[Unknown, Rejected, Expired],
            Pending,
            "submitted",
            block.now,
            &EventContext::default(),
            &mut events,
        )?;
        Ok((case, events))
    }

    /// Start an attempt and act on a validator's confidence score.
    ///
    /// In-band scores open a fallback whose first challenge is gated by the
    /// channel's limiter when `limits` is supplied. With escalation disabled an
    /// in-band score is rejected.
    pub fn evaluate_score(
        &self,
        case: &mut VerificationCase,
        score: u32,
        validator: Option<&AccountAddress>,
        limits: Option<&mut ChannelSnapshot>,
        block: &BlockContext,
    ) -> Result<(Decision, Vec<VerificationEvent>), VerificationError> {
        let mut decision = self.borderline.classify(score)?;
        let mut reject_reason = "score_below_threshold";
        if decision == Decision::Escalate && !self.borderline.params().enabled {
            decision = Decision::Reject;
            reject_reason = "escalation_disabled";
        }

        let mut next = case.clone();
        let mut events = Vec::new();
        let now = block.now;
        self.queue.begin_attempt(&mut next.request, now)?;

        let mut annotate = EventContext::default().with_score(score);
        if let Some(validator) = validator {
            annotate = annotate.with_validator(validator.clone());
        }
        self.advance_scopes(&mut next, &[Pending], InProgress, "attempt_started", now, &annotate, &mut events)?;

        match decision {
            Decision::Verify => {
                self.advance_scopes(&mut next, &[InProgress], Verified, "score_above_threshold", now, &annotate, &mut events)?;
                self.queue.complete(&mut next.request, "verified")?;
            }
            Decision::Reject => {
                self.advance_scopes(&mut next, &[InProgress], Rejected, reject_reason, now, &annotate, &mut events)?;
                self.queue.fail(&mut next.request, reject_reason)?;
            }
            Decision::Escalate => {
                let account = next.request.account_address.clone();
                let subject = format!("{}/{}", next.request.request_id, next.event_seq);
                let (record, challenge) = match limits {
                    Some(snapshot) => {
                        let method = self.first_factor()?;
                        let (record, challenge, recorded) = self.borderline.open_fallback_gated(
                            self.limiters.for_method(method),
                            snapshot.clone(),
                            &account,
                            &subject,
                            score,
                            now,
                            block.height,
                            &block.seed,
                        )?;
                        *snapshot = recorded;
                        (record, challenge)
                    }
                    None => self.borderline.open_fallback(
                        &account,
                        &subject,
                        score,
                        now,
                        block.height,
                        &block.seed,
                    )?,
                };
                for scope in &mut next.scopes {
                    scope.fallback_id = Some(record.fallback_id.clone());
                }
                let annotate = annotate
                    .with_metadata("fallback_id", &record.fallback_id)
                    .with_metadata("method", challenge.method.as_str());
                self.advance_scopes(&mut next, &[InProgress], NeedsAdditionalFactor, "borderline_score", now, &annotate, &mut events)?;
                self.advance_scopes(&mut next, &[NeedsAdditionalFactor], AdditionalFactorPending, "factor_challenge_issued", now, &annotate, &mut events)?;
                next.fallback = Some(record);
                next.challenge = Some(challenge);
            }
        }

        *case = next;
        Ok((decision, events))
    }

    /// Settle the outstanding challenge with the presented nonce and carry the
    /// fallback's outcome through to the scopes and request.
    ///
    /// When more factors are still needed the scopes return to
    /// `NeedsAdditionalFactor` until [`issue_next_challenge`](Self::issue_next_challenge).
    pub fn complete_factor<N: NonceSet + ?Sized>(
        &self,
        case: &mut VerificationCase,
        presented_nonce: &str,
        used: &mut N,
        block: &BlockContext,
    ) -> Result<(FallbackOutcome, Vec<VerificationEvent>), VerificationError> {
        let mut next = case.clone();
        let (Some(record), Some(challenge)) = (next.fallback.as_mut(), next.challenge.as_mut())
        else {
            return Err(VerificationError::NotFound(format!(
                "fallback challenge for request {}",
                case.request.request_id
            )));
        };
        let outcome = self.borderline.resolve_with_challenge(
            record,
            challenge,
            presented_nonce,
            used,
            block.now,
        )?;
        let events = self.apply_outcome(&mut next, &outcome, block.now)?;
        *case = next;
        Ok((outcome, events))
    }

    /// Issue a challenge for the next missing factor of a pending fallback.
    ///
    /// Only once the outstanding challenge has settled and every scope is back
    /// in `NeedsAdditionalFactor`.
    pub fn issue_next_challenge(
        &self,
        case: &mut VerificationCase,
        limits: Option<&mut ChannelSnapshot>,
        block: &BlockContext,
    ) -> Result<(Challenge, Vec<VerificationEvent>), VerificationError> {
        let mut next = case.clone();
        let mut record = next.pending_fallback().cloned().ok_or_else(|| {
            VerificationError::NotFound(format!(
                "pending fallback for request {}",
                case.request.request_id
            ))
        })?;
        if let Some(open) = next
            .challenge
            .as_ref()
            .filter(|c| c.status == ChallengeStatus::Pending && !c.is_expired(block.now))
        {
            return Err(VerificationError::InvalidParameter(format!(
                "challenge {} is still outstanding",
                open.challenge_id
            )));
        }
        if let Some(scope) = next.scopes.iter().find(|s| s.status != NeedsAdditionalFactor) {
            return Err(VerificationError::InvalidTransition {
                from: scope.status,
                to: AdditionalFactorPending,
            });
        }
        let method = record.missing_factors().first().copied().ok_or_else(|| {
            VerificationError::InvalidParameter(format!(
                "fallback {} has no missing factor",
                record.fallback_id
            ))
        })?;

        let limiter = self.limiters.for_method(method);
        if let Some(snapshot) = limits.as_deref() {
            let check = limiter.check_channel(snapshot, block.now)?;
            if !check.allowed {
                return Err(check.into());
            }
        }
        let challenge =
            self.borderline
                .issue_factor_challenge(&mut record, method, block.now, &block.seed)?;
        if let Some(snapshot) = limits {
            let (_, recorded) = limiter.check_and_record_channel(snapshot.clone(), block.now)?;
            *snapshot = recorded;
        }

        let mut events = Vec::new();
        let annotate = EventContext::default()
            .with_metadata("fallback_id", &record.fallback_id)
            .with_metadata("method", method.as_str());
        self.advance_scopes(
            &mut next,
            &[NeedsAdditionalFactor],
            AdditionalFactorPending,
            "factor_challenge_issued",
            block.now,
            &annotate,
            &mut events,
        )?;
        next.fallback = Some(record);
        next.challenge = Some(challenge.clone());
        *case = next;
        Ok((challenge, events))
    }

    /// The upstream channel reported the factor as failed.
    pub fn fail_factor(
        &self,
        case: &mut VerificationCase,
        reason: &str,
        block: &BlockContext,
    ) -> Result<Vec<VerificationEvent>, VerificationError> {
        self.close_fallback(case, block.now, |engine, record, challenge, now| {
            if let Some(challenge) = challenge.filter(|c| c.status == ChallengeStatus::Pending) {
                engine.borderline.registry().fail(challenge, now)?;
            }
            engine.borderline.mark_failed(record, reason, now)
        })
    }

    /// Caller-initiated abort of the pending fallback.
    pub fn cancel_fallback(
        &self,
        case: &mut VerificationCase,
        reason: &str,
        block: &BlockContext,
    ) -> Result<Vec<VerificationEvent>, VerificationError> {
        self.close_fallback(case, block.now, |engine, record, challenge, now| {
            if let Some(challenge) = challenge.filter(|c| c.status == ChallengeStatus::Pending) {
                engine.borderline.registry().revoke(challenge, reason, now)?;
            }
            engine.borderline.mark_cancelled(record, reason, now)
        })
    }

    fn close_fallback<F>(
        &self,
        case: &mut VerificationCase,
        now: Timestamp,
        close: F,
    ) -> Result<Vec<VerificationEvent>, VerificationError>
    where
        F: FnOnce(
            &Self,
            &mut FallbackRecord,
            Option<&mut Challenge>,
            Timestamp,
        ) -> Result<FallbackOutcome, VerificationError>,
    {
        let mut next = case.clone();
        let record = next.fallback.as_mut().ok_or_else(|| {
            VerificationError::NotFound(format!("fallback for request {}", case.request.request_id))
        })?;
        let outcome = close(self, record, next.challenge.as_mut(), now)?;
        let events = self.apply_outcome(&mut next, &outcome, now)?;
        *case = next;
        Ok(events)
    }

    /// Apply every deadline that has passed: an overdue fallback expires its
    /// scopes, an overdue attempt times the request out. Never fails on a case
    /// with nothing due.
    pub fn expire_due(
        &self,
        case: &mut VerificationCase,
        block: &BlockContext,
    ) -> Result<Vec<VerificationEvent>, VerificationError> {
        let now = block.now;
        let mut next = case.clone();
        let mut events = Vec::new();

        let fallback_expired = match next.fallback.as_mut() {
            Some(record) => self.borderline.expire_if_due(record, now),
            None => false,
        };
        if fallback_expired {
            if let Some(challenge) = next.challenge.as_mut() {
                self.borderline.registry().expire_if_due(challenge, now);
            }
            events = self.apply_outcome(&mut next, &FallbackOutcome::Expired, now)?;
        } else if next.pending_fallback().is_none()
            && next
                .request
                .attempt_overdue(self.queue.params().request_timeout_secs, now)
        {
            self.queue.timeout(&mut next.request, REASON_ATTEMPT_TIMEOUT)?;
            self.advance_scopes(
                &mut next,
                &[InProgress],
                Pending,
                REASON_ATTEMPT_TIMEOUT,
                now,
                &EventContext::default(),
                &mut events,
            )?;
        }

        *case = next;
        Ok(events)
    }

    /// Re-queue the request, charging one retry, and reopen its scopes.
    ///
    /// On `RetriesExhausted` the case is still updated: the request is `Failed`.
    pub fn retry(
        &self,
        case: &mut VerificationCase,
        block: &BlockContext,
    ) -> Result<Vec<VerificationEvent>, VerificationError> {
        if let Some(record) = case.pending_fallback() {
            return Err(VerificationError::InvalidParameter(format!(
                "fallback {} is still pending",
                record.fallback_id
            )));
        }
        let mut next = case.clone();
        if let Err(e) = self.queue.retry(&mut next.request, block.now) {
            if matches!(e, VerificationError::RetriesExhausted { .. }) {
                case.request = next.request;
            }
            return Err(e);
        }
        let mut events = Vec::new();
        self.advance_scopes(
            &mut next,
            &[InProgress, Rejected, Expired],
            Pending,
            "retry",
            block.now,
            &EventContext::default(),
            &mut events,
        )?;
        next.fallback = None;
        next.challenge = None;
        for scope in &mut next.scopes {
            scope.fallback_id = None;
        }
        *case = next;
        Ok(events)
    }

    /// Reject the request outright, cancelling any pending fallback.
    pub fn reject(
        &self,
        case: &mut VerificationCase,
        reason: &str,
        block: &BlockContext,
    ) -> Result<Vec<VerificationEvent>, VerificationError> {
        let now = block.now;
        let mut next = case.clone();
        if let Some(record) = next.fallback.as_mut().filter(|f| !f.status.is_terminal()) {
            self.borderline.mark_cancelled(record, reason, now)?;
            if let Some(challenge) = next
                .challenge
                .as_mut()
                .filter(|c| c.status == ChallengeStatus::Pending)
            {
                self.borderline.registry().revoke(challenge, reason, now)?;
            }
        }
        self.queue.reject(&mut next.request, reason)?;
        let mut events = Vec::new();
        self.advance_scopes(
            &mut next,
            &[Pending, InProgress, NeedsAdditionalFactor, AdditionalFactorPending],
            Rejected,
            reason,
            now,
            &EventContext::default(),
            &mut events,
        )?;
        *case = next;
        Ok(events)
    }

    fn apply_outcome(
        &self,
        case: &mut VerificationCase,
        outcome: &FallbackOutcome,
        now: Timestamp,
    ) -> Result<Vec<VerificationEvent>, VerificationError> {
        let mut events = Vec::new();
        let Some(record) = case.fallback.clone() else {
            return Ok(events);
        };
        let reason = record.close_reason.clone();
        let annotate = EventContext::default()
            .with_score(record.borderline_score)
            .with_metadata("fallback_id", &record.fallback_id);
        let awaiting = [NeedsAdditionalFactor, AdditionalFactorPending];

        match outcome {
            FallbackOutcome::Completed => {
                self.advance_scopes(case, &[AdditionalFactorPending], Verified, "fallback_completed", now, &annotate, &mut events)?;
                self.queue.complete(&mut case.request, "fallback_completed")?;
            }
            FallbackOutcome::AwaitingFactors { .. } => {
                self.advance_scopes(case, &[AdditionalFactorPending], NeedsAdditionalFactor, "additional_factor_required", now, &annotate, &mut events)?;
            }
            FallbackOutcome::Expired => {
                self.advance_scopes(case, &awaiting, Expired, "fallback_expired", now, &annotate, &mut events)?;
                self.queue.timeout(&mut case.request, "fallback_expired")?;
            }
            FallbackOutcome::Failed => {
                let reason = reason.as_deref().unwrap_or("fallback_failed");
                self.advance_scopes(case, &awaiting, Rejected, reason, now, &annotate, &mut events)?;
                self.queue.fail(&mut case.request, reason)?;
            }
            FallbackOutcome::Cancelled => {
                let reason = reason.as_deref().unwrap_or("fallback_cancelled");
                self.advance_scopes(case, &awaiting, Rejected, reason, now, &annotate, &mut events)?;
                self.queue.reject(&mut case.request, reason)?;
            }
        }
        Ok(events)
    }

    #[allow(clippy::too_many_arguments)]
    fn advance_scopes(
        &self,
        case: &mut VerificationCase,
        from: &[VerificationStatus],
        target: VerificationStatus,
        reason: &str,
        now: Timestamp,
        annotate: &EventContext,
        events: &mut Vec<VerificationEvent>,
    ) -> Result<(), VerificationError> {
        let request_id = &case.request.request_id;
        for scope in case.scopes.iter_mut().filter(|s| from.contains(&s.status)) {
            let ctx = EventContext {
                sequence: case.event_seq,
                ..annotate.clone()
            }
            .with_metadata("request_id", request_id);
            events.push(scope.advance(&self.machine, target, reason, now, ctx)?);
            case.event_seq += 1;
        }
        Ok(())
    }

    fn first_factor(&self) -> Result<FactorKind, VerificationError> {
        self.borderline
            .params()
            .required_factors
            .first()
            .copied()
            .ok_or_else(|| VerificationError::InvalidParameter("no required factors".into()))
    }
}

/// Hand `scope` to `request_id`, refusing scopes still driven by another request.
fn claim(scope: &mut ScopeState, request_id: &str) -> Result<(), VerificationError> {
    if scope.status.is_in_flight() {
        return Err(VerificationError::ScopeBusy {
            scope_id: scope.scope_id.to_string(),
            owner: scope.request_id.clone().unwrap_or_default(),
            status: scope.status,
        });
    }
    if !can_transition(scope.status, Pending) {
        return Err(VerificationError::InvalidTransition {
            from: scope.status,
            to: Pending,
        });
    }
    scope.request_id = Some(request_id.to_string());
    scope.fallback_id = None;
    Ok(())
}
