use super::{BusyReason, DecisionEngine, DecisionOutcome};
use crate::confirmation::{ConfirmationError, ConfirmationRequest, ConfirmationToken};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;

/// Shareable single-admission entry point to a [`DecisionEngine`].
///
/// Capacity is one cycle in flight. A call that arrives while another is running is
/// rejected with `Busy { reason: InFlight }` instead of waiting, so producers never
/// interleave and never queue behind a long skill.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<TokioMutex<DecisionEngine>>,
}

impl EngineHandle {
    pub fn new(engine: DecisionEngine) -> Self {
        Self {
            inner: Arc::new(TokioMutex::new(engine)),
        }
    }

    pub async fn process(&self, raw: &str) -> DecisionOutcome {
        match self.inner.try_lock() {
            Ok(mut engine) => engine.process(raw).await,
            Err(_) => in_flight(),
        }
    }

    pub async fn approve(&self, token: &ConfirmationToken) -> Result<DecisionOutcome, ConfirmationError> {
        match self.inner.try_lock() {
            Ok(mut engine) => engine.approve(token).await,
            Err(_) => Ok(in_flight()),
        }
    }

    pub async fn deny(&self, token: &ConfirmationToken) -> Result<DecisionOutcome, ConfirmationError> {
        match self.inner.try_lock() {
            Ok(mut engine) => engine.deny(token),
            Err(_) => Ok(in_flight()),
        }
    }

    /// Surfaces an expired confirmation, waiting for any running cycle to finish first.
    pub async fn expire(&self) -> Option<DecisionOutcome> {
        self.inner.lock().await.expire_at(chrono::Utc::now())
    }

    /// Snapshot of the pending confirmation, if any.
    pub async fn pending_confirmation(&self) -> Option<ConfirmationRequest> {
        self.inner.lock().await.pending_confirmation().cloned()
    }

    /// Exclusive access for setup and inspection (registry changes, tests).
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, DecisionEngine> {
        self.inner.lock().await
    }
}

fn in_flight() -> DecisionOutcome {
    tracing::info!(target: "evo::engine", "input rejected: decision cycle in flight");
    DecisionOutcome::Busy {
        reason: BusyReason::InFlight,
    }
}
