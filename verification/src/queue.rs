//! Verification request queue.
//!
//! ```text
//! Pending -> InProgress -> { Completed, Failed, Timeout, Rejected }
//! InProgress -> Pending            (retry)
//! Timeout -> InProgress | Pending  (resume / retry)
//! ```
//!
//! `Completed`, `Failed` and `Rejected` are final. `Timeout` is not: a timed
//! out request may be resumed by `begin_attempt` or re-queued by `retry`.
//! The queue imposes no ordering; `priority` is a hint for the caller's index.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use trustgate_crypto::{derive_id, DerivationInput};
use trustgate_types::{AccountAddress, BlockHeight, BlockSeed, QueueParams, ScopeId, Timestamp};

use crate::error::VerificationError;

/// Metadata key holding the first reason a request was settled with.
pub const REASON_KEY: &str = "reason";

pub const REASON_EMPTY_SCOPES: &str = "empty_scopes";
pub const REASON_INVALID_SCOPES: &str = "invalid_scopes";
pub const REASON_RETRIES_EXHAUSTED: &str = "retries_exhausted";
pub const REASON_ATTEMPT_TIMEOUT: &str = "attempt_timeout";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Timeout,
    Rejected,
}

impl RequestStatus {
    /// No transition leaves a final status.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One verification attempt over a set of scopes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub request_id: String,
    pub account_address: AccountAddress,
    pub scope_ids: Vec<ScopeId>,
    pub requested_at: Timestamp,
    pub requested_block: BlockHeight,
    pub status: RequestStatus,
    pub retry_count: u32,
    pub last_attempt_at: Option<Timestamp>,
    pub priority: u32,
    pub metadata: BTreeMap<String, String>,
}

impl VerificationRequest {
    pub fn is_final(&self) -> bool {
        self.status.is_final()
    }

    /// The first reason the request was settled with, if any.
    pub fn reason(&self) -> Option<&str> {
        self.metadata.get(REASON_KEY).map(String::as_str)
    }

    /// Whether an in-progress attempt has outlived `timeout_secs`.
    pub fn attempt_overdue(&self, timeout_secs: u64, now: Timestamp) -> bool {
        self.status == RequestStatus::InProgress
            && self
                .last_attempt_at
                .is_some_and(|at| at.plus_secs(timeout_secs) < now)
    }

    fn note_reason(&mut self, reason: &str) {
        self.metadata
            .entry(REASON_KEY.to_string())
            .or_insert_with(|| reason.to_string());
    }
}

#[derive(Clone, Debug)]
pub struct RequestQueue {
    params: QueueParams,
}

impl RequestQueue {
    pub fn new(params: QueueParams) -> Result<Self, VerificationError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &QueueParams {
        &self.params
    }

    /// Create a request.
    ///
    /// A structurally defective scope list does not fail the call: the request
    /// is returned already `Rejected` so the defect is recorded like any other
    /// outcome. Only an invalid account address is an error.
    pub fn submit(
        &self,
        account: &AccountAddress,
        scope_ids: Vec<ScopeId>,
        priority: u32,
        now: Timestamp,
        block_height: BlockHeight,
        seed: &BlockSeed,
    ) -> Result<VerificationRequest, VerificationError> {
        if !account.is_valid() {
            return Err(VerificationError::InvalidParameter(format!(
                "invalid account address {account:?}"
            )));
        }

        let ts = now.to_be_bytes();
        let height = block_height.to_be_bytes();
        let mut input = DerivationInput::new()
            .with_str(account.as_str())
            .with(&ts)
            .with(&height);
        for scope in &scope_ids {
            input = input.with_str(scope.as_str());
        }

        let mut request = VerificationRequest {
            request_id: derive_id("request", seed, &input),
            account_address: account.clone(),
            scope_ids,
            requested_at: now,
            requested_block: block_height,
            status: RequestStatus::Pending,
            retry_count: 0,
            last_attempt_at: None,
            priority,
            metadata: BTreeMap::new(),
        };

        if let Some(reason) = self.scope_defect(&request.scope_ids) {
            request.status = RequestStatus::Rejected;
            request.note_reason(reason);
            tracing::warn!(
                request_id = %request.request_id,
                account = %account,
                reason,
                "verification request rejected on submission"
            );
            return Ok(request);
        }

        tracing::debug!(
            request_id = %request.request_id,
            account = %account,
            scopes = request.scope_ids.len(),
            block = block_height,
            "verification request submitted"
        );
        Ok(request)
    }

    fn scope_defect(&self, scope_ids: &[ScopeId]) -> Option<&'static str> {
        if scope_ids.is_empty() {
            return Some(REASON_EMPTY_SCOPES);
        }
        let distinct: BTreeSet<&str> = scope_ids.iter().map(ScopeId::as_str).collect();
        if distinct.len() != scope_ids.len()
            || scope_ids.len() > self.params.max_scopes_per_request as usize
            || scope_ids.iter().any(|s| !s.is_valid())
        {
            return Some(REASON_INVALID_SCOPES);
        }
        None
    }

    /// `Pending | Timeout -> InProgress`, stamping `last_attempt_at`.
    pub fn begin_attempt(
        &self,
        request: &mut VerificationRequest,
        now: Timestamp,
    ) -> Result<(), VerificationError> {
        self.move_to(
            request,
            &[RequestStatus::Pending, RequestStatus::Timeout],
            RequestStatus::InProgress,
        )?;
        request.last_attempt_at = Some(now);
        Ok(())
    }

    /// Return a started or timed out request to `Pending`, charging one retry.
    ///
    /// A request still waiting in `Pending` has nothing to retry. Once `max_retries` have been charged the request is forced to `Failed`
    /// with reason `retries_exhausted` and `RetriesExhausted` is returned.
    pub fn retry(
        &self,
        request: &mut VerificationRequest,
        now: Timestamp,
    ) -> Result<(), VerificationError> {
        ensure_open(request)?;
        if !RETRYABLE.contains(&request.status) {
            return Err(VerificationError::InvalidRequestTransition {
                request_id: request.request_id.clone(),
                from: request.status,
                to: RequestStatus::Pending,
            });
        }
        if request.retry_count >= self.params.max_retries {
            request.status = RequestStatus::Failed;
            request.note_reason(REASON_RETRIES_EXHAUSTED);
            tracing::warn!(
                request_id = %request.request_id,
                retries = request.retry_count,
                "verification request exhausted its retries"
            );
            return Err(VerificationError::RetriesExhausted {
                request_id: request.request_id.clone(),
                max_retries: self.params.max_retries,
            });
        }
        request.retry_count += 1;
        request.status = RequestStatus::Pending;
        tracing::debug!(
            request_id = %request.request_id,
            retry = request.retry_count,
            at = %now,
            "verification request re-queued"
        );
        Ok(())
    }

    pub fn complete(
        &self,
        request: &mut VerificationRequest,
        reason: &str,
    ) -> Result<(), VerificationError> {
        self.settle(request, &[RequestStatus::InProgress], RequestStatus::Completed, reason)
    }

    /// A runtime failure. Allowed from any non-final status.
    pub fn fail(
        &self,
        request: &mut VerificationRequest,
        reason: &str,
    ) -> Result<(), VerificationError> {
        self.settle(request, OPEN, RequestStatus::Failed, reason)
    }

    pub fn timeout(
        &self,
        request: &mut VerificationRequest,
        reason: &str,
    ) -> Result<(), VerificationError> {
        self.settle(request, &[RequestStatus::InProgress], RequestStatus::Timeout, reason)
    }

    /// A structural or policy rejection. Allowed from any non-final status.
    pub fn reject(
        &self,
        request: &mut VerificationRequest,
        reason: &str,
    ) -> Result<(), VerificationError> {
        self.settle(request, OPEN, RequestStatus::Rejected, reason)
    }

    /// Externally triggered sweep moving overdue attempts to `Timeout`.
    /// Returns the ids it changed.
    pub fn sweep_timeouts(
        &self,
        requests: &mut [VerificationRequest],
        now: Timestamp,
    ) -> Vec<String> {
        let timeout = self.params.request_timeout_secs;
        requests
            .iter_mut()
            .filter(|r| r.attempt_overdue(timeout, now))
            .filter_map(|r| {
                self.timeout(r, REASON_ATTEMPT_TIMEOUT)
                    .ok()
                    .map(|()| r.request_id.clone())
            })
            .collect()
    }

    fn settle(
        &self,
        request: &mut VerificationRequest,
        from: &[RequestStatus],
        to: RequestStatus,
        reason: &str,
    ) -> Result<(), VerificationError> {
        self.move_to(request, from, to)?;
        request.note_reason(reason);
        tracing::info!(
            request_id = %request.request_id,
            status = %to,
            reason = request.reason().unwrap_or(reason),
            "verification request settled"
        );
        Ok(())
    }

    fn move_to(
        &self,
        request: &mut VerificationRequest,
        from: &[RequestStatus],
        to: RequestStatus,
    ) -> Result<(), VerificationError> {
        ensure_open(request)?;
        if !from.contains(&request.status) {
            return Err(VerificationError::InvalidRequestTransition {
                request_id: request.request_id.clone(),
                from: request.status,
                to,
            });
        }
        request.status = to;
        Ok(())
    }
}

const OPEN: &[RequestStatus] = &[
    RequestStatus::Pending,
    RequestStatus::InProgress,
    RequestStatus::Timeout,
];

const RETRYABLE: &[RequestStatus] = &[RequestStatus::InProgress, RequestStatus::Timeout];

fn ensure_open(request: &VerificationRequest) -> Result<(), VerificationError> {
    if request.is_final() {
        return Err(VerificationError::already_terminal(
            &request.request_id,
            request.status,
        ));
    }
    Ok(())
}
