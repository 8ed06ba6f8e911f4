//! Scripted replay of verification cases.
//!
//! A scenario is a TOML list of timestamped steps. Each step acts on a case
//! named by a label; the runner owns the clock, the store and the nonce set,
//! so the same file always yields the same events.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context};
use trustgate_nullables::{NullClock, NullKvStore};
use trustgate_store::VerificationRepository;
use trustgate_types::{AccountAddress, ScopeId, Timestamp};
use trustgate_verification::{
    BlockContext, EngineConfig, VerificationEngine, VerificationError, VerificationEvent,
};

#[derive(Clone, Debug, Deserialize)]
pub struct Scenario {
    /// Unix time of offset zero.
    #[serde(default = "default_start")]
    pub start: u64,
    #[serde(rename = "step", default)]
    pub steps: Vec<Step>,
}

fn default_start() -> u64 {
    1_700_000_000
}

#[derive(Clone, Debug, Deserialize)]
pub struct Step {
    /// Seconds after `start`. Offsets never decrease.
    pub at: u64,
    /// Label of the case the step acts on.
    pub case: String,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Submit {
        account: String,
        scopes: Vec<String>,
        #[serde(default)]
        priority: u32,
    },
    Score {
        score: u32,
        validator: Option<String>,
        /// Gate the first challenge through the channel limiter.
        #[serde(default)]
        gate: bool,
        phone: Option<String>,
        ip: Option<String>,
    },
    /// Present a nonce; without one the outstanding challenge's nonce is used.
    CompleteFactor { nonce: Option<String> },
    NextChallenge {
        #[serde(default)]
        gate: bool,
        phone: Option<String>,
        ip: Option<String>,
    },
    FailFactor {
        #[serde(default = "default_fail_reason")]
        reason: String,
    },
    Cancel {
        #[serde(default = "default_cancel_reason")]
        reason: String,
    },
    Expire,
    Retry,
    Reject {
        reason: String,
    },
}

fn default_fail_reason() -> String {
    "factor_failed".into()
}

fn default_cancel_reason() -> String {
    "cancelled".into()
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Submit { .. } => "submit",
            Action::Score { .. } => "score",
            Action::CompleteFactor { .. } => "complete_factor",
            Action::NextChallenge { .. } => "next_challenge",
            Action::FailFactor { .. } => "fail_factor",
            Action::Cancel { .. } => "cancel",
            Action::Expire => "expire",
            Action::Retry => "retry",
            Action::Reject { .. } => "reject",
        }
    }
}

/// What one step produced.
#[derive(Clone, Debug, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub at: Timestamp,
    pub height: i64,
    pub case: String,
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<serde_json::Value>,
    pub events: Vec<VerificationEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

#[derive(Clone, Debug, Serialize)]
pub struct StepError {
    pub kind: String,
    pub message: String,
}

impl From<&VerificationError> for StepError {
    fn from(err: &VerificationError) -> Self {
        Self {
            kind: format!("{:?}", err.kind()),
            message: err.to_string(),
        }
    }
}

impl Scenario {
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("failed to parse scenario {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let scenario: Scenario = toml::from_str(text)?;
        for pair in scenario.steps.windows(2) {
            if pair[1].at < pair[0].at {
                bail!("step at +{}s follows step at +{}s", pair[1].at, pair[0].at);
            }
        }
        Ok(scenario)
    }
}

/// Drives one engine over a scenario against an in-memory store.
pub struct Replay {
    engine: VerificationEngine,
    repo: VerificationRepository<NullKvStore>,
    clock: NullClock,
    cases: BTreeMap<String, String>,
}

impl Replay {
    pub fn new(config: &EngineConfig, start: u64) -> anyhow::Result<Self> {
        Ok(Self {
            engine: VerificationEngine::new(config)?,
            repo: VerificationRepository::new(NullKvStore::new(), config.key_prefixes.clone())?,
            clock: NullClock::new(start),
            cases: BTreeMap::new(),
        })
    }

    /// Run every step. Step failures are reported, not fatal.
    pub fn run(&mut self, scenario: &Scenario) -> Vec<StepReport> {
        let mut reports = Vec::with_capacity(scenario.steps.len());
        for (index, step) in scenario.steps.iter().enumerate() {
            let target = scenario.start + step.at;
            self.clock.advance(target.saturating_sub(self.clock.now().as_secs()));
            let block = self.clock.block();
            let report = self.apply(index, step, &block);
            match &report.error {
                Some(err) => tracing::warn!(
                    step = index,
                    case = %step.case,
                    action = report.action,
                    kind = %err.kind,
                    "step failed: {}",
                    err.message
                ),
                None => tracing::debug!(
                    step = index,
                    case = %step.case,
                    action = report.action,
                    events = report.events.len(),
                    "step applied"
                ),
            }
            reports.push(report);
        }
        reports
    }

    #[cfg(test)]
    pub fn case(&self, label: &str) -> anyhow::Result<Option<trustgate_verification::VerificationCase>> {
        match self.cases.get(label) {
            Some(id) => Ok(self.repo.load_case(id)?),
            None => Ok(None),
        }
    }

    fn apply(&mut self, index: usize, step: &Step, block: &BlockContext) -> StepReport {
        let mut report = StepReport {
            step: index,
            at: block.now,
            height: block.height,
            case: step.case.clone(),
            action: step.action.name(),
            request_id: self.cases.get(&step.case).cloned(),
            outcome: None,
            events: Vec::new(),
            error: None,
        };
        match self.execute(step, block) {
            Ok((request_id, outcome, events)) => {
                report.request_id = Some(request_id);
                report.outcome = outcome;
                report.events = events;
            }
            Err(err) => report.error = Some(StepError::from(&err)),
        }
        report
    }

    fn execute(
        &mut self,
        step: &Step,
        block: &BlockContext,
    ) -> Result<(String, Option<serde_json::Value>, Vec<VerificationEvent>), VerificationError>
    {
        if let Action::Submit {
            account,
            scopes,
            priority,
        } = &step.action
        {
            if self.cases.contains_key(&step.case) {
                return Err(VerificationError::InvalidParameter(format!(
                    "case label {} already submitted",
                    step.case
                )));
            }
            let account = AccountAddress::new(account.as_str());
            let scope_ids = scopes.iter().map(ScopeId::new).collect();
            let known = self.repo.scopes_for_account(&account)?;
            let (case, events) =
                self.engine
                    .submit(&account, scope_ids, *priority, &known, block)?;
            self.repo.put_case(&case)?;
            let request_id = case.request.request_id.clone();
            self.cases.insert(step.case.clone(), request_id.clone());
            let outcome = to_value(&case.request.status);
            return Ok((request_id, outcome, events));
        }

        let request_id = self.cases.get(&step.case).cloned().ok_or_else(|| {
            VerificationError::NotFound(format!("case label {}", step.case))
        })?;
        let mut case = self.repo.require_case(&request_id)?;

        let (outcome, events) = match &step.action {
            Action::Submit { .. } => {
                return Err(VerificationError::InvalidParameter(format!(
                    "case label {} already submitted",
                    step.case
                )))
            }
            Action::Score {
                score,
                validator,
                gate,
                phone,
                ip,
            } => {
                let validator = validator.as_deref().map(AccountAddress::new);
                let mut limits = if *gate || phone.is_some() || ip.is_some() {
                    Some(self.repo.channel_snapshot(
                        &case.request.account_address,
                        phone.as_deref(),
                        ip.as_deref(),
                    )?)
                } else {
                    None
                };
                let (decision, events) = self.engine.evaluate_score(
                    &mut case,
                    *score,
                    validator.as_ref(),
                    limits.as_mut(),
                    block,
                )?;
                if let Some(snapshot) = &limits {
                    self.repo.put_channel_snapshot(snapshot)?;
                }
                (to_value(&decision), events)
            }
            Action::CompleteFactor { nonce } => {
                let presented = match nonce {
                    Some(n) => n.clone(),
                    None => case
                        .challenge
                        .as_ref()
                        .map(|c| c.nonce.clone())
                        .unwrap_or_default(),
                };
                let (outcome, events) =
                    self.engine
                        .complete_factor(&mut case, &presented, &mut self.repo, block)?;
                (to_value(&outcome), events)
            }
            Action::NextChallenge { gate, phone, ip } => {
                let mut limits = if *gate || phone.is_some() || ip.is_some() {
                    Some(self.repo.channel_snapshot(
                        &case.request.account_address,
                        phone.as_deref(),
                        ip.as_deref(),
                    )?)
                } else {
                    None
                };
                let (challenge, events) =
                    self.engine
                        .issue_next_challenge(&mut case, limits.as_mut(), block)?;
                if let Some(snapshot) = &limits {
                    self.repo.put_channel_snapshot(snapshot)?;
                }
                (to_value(&challenge.method), events)
            }
            Action::FailFactor { reason } => {
                (None, self.engine.fail_factor(&mut case, reason, block)?)
            }
            Action::Cancel { reason } => {
                (None, self.engine.cancel_fallback(&mut case, reason, block)?)
            }
            Action::Expire => (None, self.engine.expire_due(&mut case, block)?),
            Action::Retry => {
                let result = self.engine.retry(&mut case, block);
                // An exhausted budget still settles the request as failed.
                self.repo.put_case(&case)?;
                (None, result?)
            }
            Action::Reject { reason } => (None, self.engine.reject(&mut case, reason, block)?),
        };
        self.repo.put_case(&case)?;
        let outcome = outcome.or_else(|| to_value(&case.request.status));
        Ok((request_id, outcome, events))
    }
}

fn to_value<T: Serialize>(value: &T) -> Option<serde_json::Value> {
    serde_json::to_value(value).ok()
}
