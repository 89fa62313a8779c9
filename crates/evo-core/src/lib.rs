//! evo-core: the EVO decision core (normalization, skill registry, confirmation gate,
//! decision engine, local memory).
//!
//! Hosts build a [`SkillRegistry`] explicitly, open a [`MemoryStore`], and hand both to a
//! [`DecisionEngine`]; everything else flows through [`DecisionOutcome`] values.

mod config;
mod confirmation;
mod engine;
mod input;
mod memory;
mod registry;
mod skills;

// Configuration
pub use config::EvoConfig;

// Input normalization
pub use input::{normalize_phrase, tokenize, InputError, NormalizedInput};

// Memory (sled + hot cache)
pub use memory::{normalize_key, MemoryError, MemoryReader, MemoryRecord, MemoryStore, RecordId};

// Skill contract and registry
pub use registry::{Candidates, MatchCandidate, MatchKind, RegistrationError, Score, SkillRegistry};
pub use skills::{
    ErrorKind, HostAction, MemoryWrite, PatternKind, Skill, SkillDescriptor, SkillError, SkillInput,
    SkillResult, TriggerPattern,
};

// Confirmation gate
pub use confirmation::{
    ConfirmationError, ConfirmationGate, ConfirmationRequest, ConfirmationToken, RequestId, Resolution,
};

// Decision engine
pub use engine::{BusyReason, CancelReason, DecisionEngine, DecisionOutcome, EngineHandle, INTERACTIONS_KEY};
