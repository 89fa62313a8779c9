//! EvoBrain: the decision engine.
//!
//! One `process` call is one decision cycle: normalize, match, resolve ties, gate sensitive
//! skills behind a confirmation, execute, apply requested memory writes, record the
//! interaction, return exactly one [`DecisionOutcome`]. The engine takes `&mut self`, so a
//! cycle always runs to completion before the next one starts; [`EngineHandle`] is the
//! single-admission entry point for hosts with several producers.

mod handle;

pub use handle::EngineHandle;

use crate::config::EvoConfig;
use crate::confirmation::{ConfirmationError, ConfirmationGate, ConfirmationRequest, ConfirmationToken, RequestId};
use crate::input::NormalizedInput;
use crate::memory::{MemoryError, MemoryStore};
use crate::registry::SkillRegistry;
use crate::skills::{ErrorKind, MemoryWrite, Skill, SkillInput, SkillResult, TriggerPattern};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::Serialize;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Default memory key that receives one record per decision cycle.
pub const INTERACTIONS_KEY: &str = "evo/interactions";

/// Why a confirmation ended without execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    Denied,
    Expired,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CancelReason::Denied => "denied",
            CancelReason::Expired => "expired",
        })
    }
}

/// Why an input was rejected without being decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyReason {
    /// A sensitive skill matched while another confirmation is still pending.
    ConfirmationPending,
    /// Another decision cycle is in flight on the same engine.
    InFlight,
}

/// Terminal result of one decision cycle or confirmation answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DecisionOutcome {
    /// No capability applies (also the answer to empty input).
    Unhandled,
    /// Two or more skills tie for the top score; nothing ran.
    Ambiguous { candidates: Vec<String> },
    /// A sensitive skill is waiting for `approve`/`deny` with `token`.
    AwaitingConfirmation {
        request_id: RequestId,
        token: ConfirmationToken,
        skill: String,
    },
    Executed { skill: String, result: SkillResult },
    Failed {
        skill: String,
        kind: ErrorKind,
        message: String,
    },
    Cancelled { skill: String, reason: CancelReason },
    Busy { reason: BusyReason },
}

impl DecisionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DecisionOutcome::Unhandled => "unhandled",
            DecisionOutcome::Ambiguous { .. } => "ambiguous",
            DecisionOutcome::AwaitingConfirmation { .. } => "awaiting_confirmation",
            DecisionOutcome::Executed { .. } => "executed",
            DecisionOutcome::Failed { .. } => "failed",
            DecisionOutcome::Cancelled { .. } => "cancelled",
            DecisionOutcome::Busy { .. } => "busy",
        }
    }

    /// Skill the outcome concerns, when there is exactly one.
    pub fn skill(&self) -> Option<&str> {
        match self {
            DecisionOutcome::AwaitingConfirmation { skill, .. }
            | DecisionOutcome::Executed { skill, .. }
            | DecisionOutcome::Failed { skill, .. }
            | DecisionOutcome::Cancelled { skill, .. } => Some(skill),
            _ => None,
        }
    }
}

/// What the engine needs to run a skill once its confirmation is approved.
#[derive(Debug)]
struct PendingDispatch {
    request: RequestId,
    input: NormalizedInput,
    pattern: TriggerPattern,
}

/// The decision engine ("EvoBrain").
pub struct DecisionEngine {
    registry: SkillRegistry,
    memory: Arc<MemoryStore>,
    gate: ConfirmationGate,
    pending: Option<PendingDispatch>,
    record_interactions: bool,
    interactions_key: String,
    /// Newest interaction records kept; 0 keeps all.
    interaction_history_limit: usize,
}

impl DecisionEngine {
    pub fn new(registry: SkillRegistry, memory: Arc<MemoryStore>, config: &EvoConfig) -> Self {
        tracing::info!(
            target: "evo::engine",
            app = %config.app_name,
            skills = registry.len(),
            confirm_timeout_secs = config.confirm_timeout_secs,
            "decision engine ready"
        );
        Self {
            registry,
            memory,
            gate: ConfirmationGate::new(config.confirm_timeout()),
            pending: None,
            record_interactions: config.record_interactions,
            interactions_key: config.interactions_key.clone(),
            interaction_history_limit: config.interaction_history_limit,
        }
    }

    pub fn registry(&self) -> &SkillRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SkillRegistry {
        &mut self.registry
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub fn pending_confirmation(&self) -> Option<&ConfirmationRequest> {
        self.gate.pending()
    }

    pub async fn process(&mut self, raw: &str) -> DecisionOutcome {
        self.process_at(raw, Utc::now()).await
    }

    /// Runs one decision cycle as of `now`.
    pub async fn process_at(&mut self, raw: &str, now: DateTime<Utc>) -> DecisionOutcome {
        // A stale confirmation is cancelled; the new input is still decided normally.
        self.expire_at(now);

        let input = match NormalizedInput::parse(raw) {
            Ok(input) => input,
            Err(e) => {
                tracing::debug!(target: "evo::engine", error = %e, "input ignored");
                return DecisionOutcome::Unhandled;
            }
        };

        let mut candidates = self.registry.match_input(&input);
        let Some(top) = candidates.next() else {
            let outcome = DecisionOutcome::Unhandled;
            self.record(&input, &outcome, now);
            return outcome;
        };
        let tied: Vec<String> = candidates
            .take_while(|c| c.score == top.score)
            .map(|c| c.skill)
            .collect();
        if !tied.is_empty() {
            let mut names = vec![top.skill];
            names.extend(tied);
            tracing::info!(target: "evo::engine", candidates = ?names, score = %top.score, "ambiguous input");
            let outcome = DecisionOutcome::Ambiguous { candidates: names };
            self.record(&input, &outcome, now);
            return outcome;
        }

        let outcome = if top.sensitive {
            match self.gate.request(&top.skill, input.raw(), now) {
                Ok(request) => {
                    self.pending = Some(PendingDispatch {
                        request: request.id,
                        input: input.clone(),
                        pattern: top.pattern,
                    });
                    DecisionOutcome::AwaitingConfirmation {
                        request_id: request.id,
                        token: request.token,
                        skill: request.skill,
                    }
                }
                Err(_) => DecisionOutcome::Busy {
                    reason: BusyReason::ConfirmationPending,
                },
            }
        } else {
            match self.registry.get(&top.skill) {
                Some(descriptor) => {
                    let capability = Arc::clone(descriptor.capability());
                    self.run(&top.skill, capability, &input, &top.pattern).await
                }
                None => unavailable(&top.skill),
            }
        };
        self.record(&input, &outcome, now);
        outcome
    }

    pub async fn approve(&mut self, token: &ConfirmationToken) -> Result<DecisionOutcome, ConfirmationError> {
        self.approve_at(token, Utc::now()).await
    }

    /// Approves the pending request bound to `token` and executes its skill.
    ///
    /// `Err(UnknownToken)` leaves any pending request untouched. A token whose request has
    /// timed out yields `Ok(Cancelled { reason: Expired })`.
    pub async fn approve_at(
        &mut self,
        token: &ConfirmationToken,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome, ConfirmationError> {
        if let Some(outcome) = self.expired_answer(token, now)? {
            return Ok(outcome);
        }
        let request = self.gate.approve(token, now)?;
        let dispatch = self.pending.take().filter(|p| p.request == request.id);

        let outcome = match (dispatch, self.registry.get(&request.skill)) {
            (Some(dispatch), Some(descriptor)) => {
                let capability = Arc::clone(descriptor.capability());
                let outcome = self.run(&request.skill, capability, &dispatch.input, &dispatch.pattern).await;
                self.record(&dispatch.input, &outcome, now);
                outcome
            }
            _ => unavailable(&request.skill),
        };
        Ok(outcome)
    }

    pub fn deny(&mut self, token: &ConfirmationToken) -> Result<DecisionOutcome, ConfirmationError> {
        self.deny_at(token, Utc::now())
    }

    /// Denies the pending request bound to `token`. Nothing executes.
    pub fn deny_at(
        &mut self,
        token: &ConfirmationToken,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome, ConfirmationError> {
        if let Some(outcome) = self.expired_answer(token, now)? {
            return Ok(outcome);
        }
        let request = self.gate.deny(token, now)?;
        let dispatch = self.pending.take().filter(|p| p.request == request.id);
        let outcome = DecisionOutcome::Cancelled {
            skill: request.skill,
            reason: CancelReason::Denied,
        };
        if let Some(dispatch) = dispatch {
            self.record(&dispatch.input, &outcome, now);
        }
        Ok(outcome)
    }

    /// Expires the pending request if its timeout has passed, reporting it as cancelled.
    pub fn expire_at(&mut self, now: DateTime<Utc>) -> Option<DecisionOutcome> {
        let (request, dispatch) = self.drop_expired(now)?;
        let outcome = DecisionOutcome::Cancelled {
            skill: request.skill,
            reason: CancelReason::Expired,
        };
        if let Some(dispatch) = dispatch {
            self.record(&dispatch.input, &outcome, now);
        }
        Some(outcome)
    }

    /// Runs the expiry precondition before an answer. Returns the expired outcome when
    /// `token` was the one that timed out, `UnknownToken` when a different request expired.
    /// Either way the expired request is recorded as cancelled.
    fn expired_answer(
        &mut self,
        token: &ConfirmationToken,
        now: DateTime<Utc>,
    ) -> Result<Option<DecisionOutcome>, ConfirmationError> {
        let Some((request, dispatch)) = self.drop_expired(now) else {
            return Ok(None);
        };
        let answered = request.token == *token;
        let outcome = DecisionOutcome::Cancelled {
            skill: request.skill,
            reason: CancelReason::Expired,
        };
        if let Some(dispatch) = dispatch {
            self.record(&dispatch.input, &outcome, now);
        }
        if !answered {
            tracing::info!(
                target: "evo::engine",
                request = %request.id,
                "pending confirmation expired before a foreign token arrived"
            );
            return Err(ConfirmationError::UnknownToken);
        }
        Ok(Some(outcome))
    }

    fn drop_expired(&mut self, now: DateTime<Utc>) -> Option<(ConfirmationRequest, Option<PendingDispatch>)> {
        let request = self.gate.expire(now)?;
        let dispatch = self.pending.take().filter(|p| p.request == request.id);
        Some((request, dispatch))
    }

    async fn run(
        &self,
        skill: &str,
        capability: Arc<dyn Skill>,
        input: &NormalizedInput,
        pattern: &TriggerPattern,
    ) -> DecisionOutcome {
        let memory = self.memory.reader();
        let skill_input = SkillInput::new(input, pattern);
        let execution = AssertUnwindSafe(capability.execute(&skill_input, &memory)).catch_unwind().await;

        match execution {
            Ok(Ok(result)) => match self.apply_writes(skill, &result.memory_writes) {
                Ok(()) => {
                    tracing::info!(
                        target: "evo::engine",
                        skill = %skill,
                        writes = result.memory_writes.len(),
                        action = result.action.as_ref().map(|a| a.name.as_str()).unwrap_or(""),
                        "skill executed"
                    );
                    DecisionOutcome::Executed {
                        skill: skill.to_string(),
                        result,
                    }
                }
                Err(e) => {
                    tracing::warn!(target: "evo::engine", skill = %skill, error = %e, "skill memory write failed");
                    DecisionOutcome::Failed {
                        skill: skill.to_string(),
                        kind: ErrorKind::Storage,
                        message: e.to_string(),
                    }
                }
            },
            Ok(Err(e)) => {
                tracing::warn!(target: "evo::engine", skill = %skill, kind = %e.kind(), error = %e, "skill failed");
                DecisionOutcome::Failed {
                    skill: skill.to_string(),
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "skill panicked".to_string());
                tracing::error!(target: "evo::engine", skill = %skill, panic = %message, "skill panicked");
                DecisionOutcome::Failed {
                    skill: skill.to_string(),
                    kind: ErrorKind::Panicked,
                    message,
                }
            }
        }
    }

    /// Applies a skill's requested writes in order; stops at the first failure.
    fn apply_writes(&self, skill: &str, writes: &[MemoryWrite]) -> Result<(), MemoryError> {
        for write in writes {
            match write {
                MemoryWrite::Put { key, content } => {
                    self.memory.put(key, content.clone())?;
                }
                MemoryWrite::Append { key, content } => {
                    self.memory.append(key, content.clone())?;
                }
                MemoryWrite::Remove { key } => {
                    let removed = self.memory.remove(key)?;
                    tracing::debug!(target: "evo::engine", skill = %skill, key = %key, removed, "memory key removed");
                }
            }
        }
        Ok(())
    }

    /// Best-effort interaction log; a failure never changes the outcome.
    fn record(&self, input: &NormalizedInput, outcome: &DecisionOutcome, now: DateTime<Utc>) {
        if !self.record_interactions {
            return;
        }
        let entry = serde_json::json!({
            "input": input.raw(),
            "skill": outcome.skill(),
            "outcome": outcome.label(),
            "at": now.to_rfc3339(),
        });
        let written = match self.interaction_history_limit {
            0 => self.memory.append(&self.interactions_key, entry),
            keep => self.memory.append_bounded(&self.interactions_key, entry, keep),
        };
        if let Err(e) = written {
            tracing::warn!(
                target: "evo::engine",
                outcome = outcome.label(),
                error = %e,
                "interaction record not persisted"
            );
        }
    }
}

fn unavailable(skill: &str) -> DecisionOutcome {
    tracing::warn!(target: "evo::engine", skill = %skill, "skill no longer registered");
    DecisionOutcome::Failed {
        skill: skill.to_string(),
        kind: ErrorKind::Unavailable,
        message: format!("skill '{}' is no longer registered", skill),
    }
}
