//! Confirmation gate: explicit human approval for sensitive skills.
//!
//! At most one request is outstanding. Each request carries a single-use token, so an
//! approval can only ever apply to the exact input that produced it. Expiry is a
//! precondition check run at the start of every gate operation (no background sweep);
//! callers pass `now` explicitly, which keeps the engine deterministic under test.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Single-use token that binds an approval to one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfirmationToken(Uuid);

impl ConfirmationToken {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConfirmationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConfirmationToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Per-gate sequential request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// A pending approval for one sensitive skill invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub id: RequestId,
    pub token: ConfirmationToken,
    pub skill: String,
    /// The exact raw input that selected the skill.
    pub raw_input: String,
    pub created_at: DateTime<Utc>,
}

/// How a request left the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Approved,
    Denied,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfirmationError {
    /// Another request is still pending; new ones are rejected, never queued.
    #[error("a confirmation is already pending ({pending})")]
    Busy { pending: RequestId },
    /// The token does not belong to the pending request (stale, duplicate, or foreign).
    #[error("unknown confirmation token")]
    UnknownToken,
    /// The token belonged to a request that timed out before it was answered.
    #[error("confirmation {request} expired")]
    Expired { request: RequestId },
}

/// State machine: idle -> pending -> {approved | denied | expired} -> idle.
#[derive(Debug)]
pub struct ConfirmationGate {
    timeout: Duration,
    pending: Option<ConfirmationRequest>,
    next_id: u64,
}

impl ConfirmationGate {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: None,
            next_id: 1,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn pending(&self) -> Option<&ConfirmationRequest> {
        self.pending.as_ref()
    }

    /// When the pending request (if any) stops being answerable.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        let pending = self.pending.as_ref()?;
        let timeout = chrono::Duration::from_std(self.timeout).ok()?;
        pending.created_at.checked_add_signed(timeout)
    }

    /// Opens a request for `skill`. Fails with `Busy` while another request is pending.
    pub fn request(
        &mut self,
        skill: &str,
        raw_input: &str,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationRequest, ConfirmationError> {
        self.expire(now);
        if let Some(pending) = &self.pending {
            tracing::info!(
                target: "evo::confirm",
                skill = %skill,
                pending = %pending.id,
                "confirmation rejected: gate busy"
            );
            return Err(ConfirmationError::Busy { pending: pending.id });
        }
        let request = ConfirmationRequest {
            id: RequestId(self.next_id),
            token: ConfirmationToken::generate(),
            skill: skill.to_string(),
            raw_input: raw_input.to_string(),
            created_at: now,
        };
        self.next_id += 1;
        tracing::info!(
            target: "evo::confirm",
            skill = %skill,
            request = %request.id,
            timeout_secs = self.timeout.as_secs(),
            "confirmation requested"
        );
        self.pending = Some(request.clone());
        Ok(request)
    }

    /// Approves the pending request if `token` matches it; the request is consumed.
    pub fn approve(
        &mut self,
        token: &ConfirmationToken,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationRequest, ConfirmationError> {
        self.resolve(token, now, Resolution::Approved)
    }

    /// Denies the pending request if `token` matches it; the request is consumed.
    pub fn deny(
        &mut self,
        token: &ConfirmationToken,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationRequest, ConfirmationError> {
        self.resolve(token, now, Resolution::Denied)
    }

    /// Drops the pending request if it is older than the timeout. Returns the expired request.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Option<ConfirmationRequest> {
        let expired = match &self.pending {
            Some(p) => match (now - p.created_at).to_std() {
                Ok(age) => age > self.timeout,
                // Clock went backwards relative to creation: not expired.
                Err(_) => false,
            },
            None => false,
        };
        if !expired {
            return None;
        }
        let request = self.pending.take()?;
        tracing::info!(
            target: "evo::confirm",
            skill = %request.skill,
            request = %request.id,
            resolution = "expired",
            "confirmation expired"
        );
        Some(request)
    }

    fn resolve(
        &mut self,
        token: &ConfirmationToken,
        now: DateTime<Utc>,
        resolution: Resolution,
    ) -> Result<ConfirmationRequest, ConfirmationError> {
        if let Some(expired) = self.expire(now) {
            return Err(if expired.token == *token {
                ConfirmationError::Expired { request: expired.id }
            } else {
                ConfirmationError::UnknownToken
            });
        }
        match &self.pending {
            Some(p) if p.token == *token => {}
            _ => {
                tracing::warn!(target: "evo::confirm", "confirmation answer with unknown token ignored");
                return Err(ConfirmationError::UnknownToken);
            }
        }
        let request = self.pending.take().ok_or(ConfirmationError::UnknownToken)?;
        tracing::info!(
            target: "evo::confirm",
            skill = %request.skill,
            request = %request.id,
            resolution = ?resolution,
            "confirmation resolved"
        );
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    #[test]
    fn approve_consumes_the_request() {
        let mut gate = ConfirmationGate::new(Duration::from_secs(8));
        let req = gate.request("clear_notes", "delete all notes", t0()).unwrap();
        let approved = gate.approve(&req.token, t0() + secs(1)).unwrap();
        assert_eq!(approved.skill, "clear_notes");
        assert!(gate.pending().is_none());
        assert_eq!(gate.approve(&req.token, t0() + secs(2)), Err(ConfirmationError::UnknownToken));
    }

    #[test]
    fn second_request_is_busy() {
        let mut gate = ConfirmationGate::new(Duration::from_secs(8));
        let first = gate.request("a", "x", t0()).unwrap();
        assert_eq!(
            gate.request("b", "y", t0() + secs(1)),
            Err(ConfirmationError::Busy { pending: first.id })
        );
        assert_eq!(gate.pending().map(|p| p.skill.as_str()), Some("a"));
    }

    #[test]
    fn foreign_token_does_not_touch_pending() {
        let mut gate = ConfirmationGate::new(Duration::from_secs(8));
        let first = gate.request("a", "x", t0()).unwrap();
        gate.deny(&first.token, t0()).unwrap();
        let second = gate.request("a", "x", t0()).unwrap();

        assert_eq!(gate.approve(&first.token, t0()), Err(ConfirmationError::UnknownToken));
        assert_eq!(gate.pending(), Some(&second));
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn expiry_is_checked_before_answers_and_requests() {
        let mut gate = ConfirmationGate::new(Duration::from_secs(8));
        let req = gate.request("a", "x", t0()).unwrap();
        assert_eq!(gate.deadline(), Some(t0() + secs(8)));

        // Exactly at the timeout the request is still answerable.
        assert!(gate.expire(t0() + secs(8)).is_none());

        assert_eq!(
            gate.approve(&req.token, t0() + secs(9)),
            Err(ConfirmationError::Expired { request: req.id })
        );
        assert!(gate.pending().is_none());

        gate.request("a", "x", t0() + secs(10)).unwrap();
        let fresh = gate.request("b", "y", t0() + secs(30));
        assert!(fresh.is_ok(), "stale request must be expired before a new one is accepted");
    }

    #[test]
    fn token_parses_from_display() {
        let mut gate = ConfirmationGate::new(Duration::from_secs(8));
        let req = gate.request("a", "x", t0()).unwrap();
        let parsed: ConfirmationToken = req.token.to_string().parse().unwrap();
        assert_eq!(parsed, req.token);
        assert!("not-a-token".parse::<ConfirmationToken>().is_err());
    }
}
