//! Verification status machine.
//!
//! The transition table is the only way a scope's [`VerificationStatus`]
//! changes. Every accepted transition yields exactly one immutable
//! [`VerificationEvent`]; a rejected transition leaves the status untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use trustgate_crypto::{derive_id, DerivationInput};
use trustgate_types::{AccountAddress, BlockSeed, ScopeId, Timestamp, VerificationStatus};

use crate::error::VerificationError;

use VerificationStatus::*;

/// Directed transitions out of each status.
pub fn allowed_targets(current: VerificationStatus) -> &'static [VerificationStatus] {
    match current {
        Unknown => &[Pending],
        Pending => &[InProgress, Rejected, Expired],
        InProgress => &[Verified, Rejected, Pending, NeedsAdditionalFactor],
        Verified => &[Expired],
        Rejected => &[Pending],
        Expired => &[Pending],
        NeedsAdditionalFactor => &[AdditionalFactorPending, Rejected, Expired],
        AdditionalFactorPending => &[Verified, Rejected, Expired, NeedsAdditionalFactor],
    }
}

/// Whether `current -> target` is in the transition table.
pub fn can_transition(current: VerificationStatus, target: VerificationStatus) -> bool {
    allowed_targets(current).contains(&target)
}

/// Append-only audit record of one accepted transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationEvent {
    pub event_id: String,
    pub scope_id: Option<ScopeId>,
    pub previous_status: VerificationStatus,
    pub new_status: VerificationStatus,
    pub timestamp: Timestamp,
    pub reason: String,
    pub validator_address: Option<AccountAddress>,
    pub score: Option<u32>,
    pub metadata: BTreeMap<String, String>,
}

/// Optional annotations attached to the event of a transition.
#[derive(Clone, Debug, Default)]
pub struct EventContext {
    pub scope_id: Option<ScopeId>,
    pub validator_address: Option<AccountAddress>,
    pub score: Option<u32>,
    pub metadata: BTreeMap<String, String>,
    /// Disambiguates repeated identical transitions within the same second.
    pub sequence: u64,
}

impl EventContext {
    pub fn for_scope(scope_id: ScopeId) -> Self {
        Self {
            scope_id: Some(scope_id),
            ..Self::default()
        }
    }

    pub fn with_score(mut self, score: u32) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_validator(mut self, validator: AccountAddress) -> Self {
        self.validator_address = Some(validator);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Applies the transition table.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatusMachine;

impl StatusMachine {
    pub fn can_transition(&self, current: VerificationStatus, target: VerificationStatus) -> bool {
        can_transition(current, target)
    }

    /// Validate `current -> target` and produce the new status with its event.
    pub fn apply(
        &self,
        current: VerificationStatus,
        target: VerificationStatus,
        reason: &str,
        now: Timestamp,
    ) -> Result<(VerificationStatus, VerificationEvent), VerificationError> {
        self.apply_with(current, target, reason, now, &EventContext::default())
    }

    pub fn apply_with(
        &self,
        current: VerificationStatus,
        target: VerificationStatus,
        reason: &str,
        now: Timestamp,
        ctx: &EventContext,
    ) -> Result<(VerificationStatus, VerificationEvent), VerificationError> {
        if !can_transition(current, target) {
            return Err(VerificationError::InvalidTransition {
                from: current,
                to: target,
            });
        }
        let event = VerificationEvent {
            event_id: event_id(current, target, reason, now, ctx),
            scope_id: ctx.scope_id.clone(),
            previous_status: current,
            new_status: target,
            timestamp: now,
            reason: reason.to_string(),
            validator_address: ctx.validator_address.clone(),
            score: ctx.score,
            metadata: ctx.metadata.clone(),
        };
        tracing::debug!(
            scope = ?ctx.scope_id,
            from = %current,
            to = %target,
            reason,
            "status transition"
        );
        Ok((target, event))
    }

    /// Transition a status in place. On error the status is left unchanged.
    pub fn transition(
        &self,
        status: &mut VerificationStatus,
        target: VerificationStatus,
        reason: &str,
        now: Timestamp,
        ctx: &EventContext,
    ) -> Result<VerificationEvent, VerificationError> {
        let (next, event) = self.apply_with(*status, target, reason, now, ctx)?;
        *status = next;
        Ok(event)
    }
}

fn event_id(
    from: VerificationStatus,
    to: VerificationStatus,
    reason: &str,
    now: Timestamp,
    ctx: &EventContext,
) -> String {
    let ts = now.to_be_bytes();
    let seq = ctx.sequence.to_be_bytes();
    let scope = ctx.scope_id.as_ref().map(|s| s.as_str()).unwrap_or("");
    let mut input = DerivationInput::new()
        .with_str(scope)
        .with_str(from.as_str())
        .with_str(to.as_str())
        .with(&ts)
        .with_str(reason)
        .with(&seq);
    for (key, value) in &ctx.metadata {
        input = input.with_str(key).with_str(value);
    }
    derive_id("event", &BlockSeed::ZERO, &input)
}

/// The persisted status of one claimed scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeState {
    pub account: AccountAddress,
    pub scope_id: ScopeId,
    pub status: VerificationStatus,
    /// The request that last claimed the scope. Only it may move the scope
    /// while the status is in flight.
    pub request_id: Option<String>,
    /// The fallback record driving this scope while it awaits a factor.
    pub fallback_id: Option<String>,
    pub updated_at: Timestamp,
    pub verified_at: Option<Timestamp>,
}

impl ScopeState {
    pub fn new(account: AccountAddress, scope_id: ScopeId) -> Self {
        Self {
            account,
            scope_id,
            status: VerificationStatus::Unknown,
            request_id: None,
            fallback_id: None,
            updated_at: Timestamp::EPOCH,
            verified_at: None,
        }
    }

    /// Whether `request_id` owns the scope.
    pub fn owned_by(&self, request_id: &str) -> bool {
        self.request_id.as_deref() == Some(request_id)
    }

    /// Drive this scope through `machine`, stamping scope id and timestamps.
    pub fn advance(
        &mut self,
        machine: &StatusMachine,
        target: VerificationStatus,
        reason: &str,
        now: Timestamp,
        ctx: EventContext,
    ) -> Result<VerificationEvent, VerificationError> {
        let ctx = EventContext {
            scope_id: Some(self.scope_id.clone()),
            ..ctx
        };
        let event = machine.transition(&mut self.status, target, reason, now, &ctx)?;
        self.updated_at = now;
        if target == Verified {
            self.verified_at = Some(now);
        }
        Ok(event)
    }
}
