//! Skill contract: what a capability must provide to be registered and dispatched.
//!
//! A skill is a typed value implementing [`Skill`]. At registration the registry snapshots it
//! into a [`SkillDescriptor`] (name, trigger patterns, sensitivity), so identity and
//! sensitivity are fixed for the lifetime of the registry.
//!
//! Skills get a read-only [`MemoryReader`]. They never write memory themselves; a result
//! lists the [`MemoryWrite`]s it wants and the engine applies them after execution.

use crate::input::{tokenize, NormalizedInput};
use crate::memory::{MemoryError, MemoryReader};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How a trigger pattern is compared with normalized input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// The whole input must equal the phrase.
    Exact,
    /// The input must start with the phrase at a token boundary.
    Prefix,
    /// Every token of the pattern must occur somewhere in the input.
    TokenSet,
}

/// One trigger pattern of a skill, stored in normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerPattern {
    kind: PatternKind,
    tokens: Vec<String>,
}

impl TriggerPattern {
    pub fn exact(phrase: &str) -> Self {
        Self::new(PatternKind::Exact, phrase)
    }

    pub fn prefix(phrase: &str) -> Self {
        Self::new(PatternKind::Prefix, phrase)
    }

    /// Token-set pattern: order-insensitive, duplicates collapsed.
    pub fn token_set(phrase: &str) -> Self {
        let mut pattern = Self::new(PatternKind::TokenSet, phrase);
        let mut seen = std::collections::HashSet::new();
        pattern.tokens.retain(|t| seen.insert(t.clone()));
        pattern
    }

    fn new(kind: PatternKind, phrase: &str) -> Self {
        Self {
            kind,
            tokens: tokenize(phrase),
        }
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Normalized phrase (tokens joined by single spaces).
    pub fn text(&self) -> String {
        self.tokens.join(" ")
    }

    /// Character length of the normalized phrase; the secondary tie-break between candidates.
    pub fn len_chars(&self) -> usize {
        let spaces = self.tokens.len().saturating_sub(1);
        self.tokens.iter().map(|t| t.chars().count()).sum::<usize>() + spaces
    }

    /// A pattern is usable only if normalization left at least one token.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl fmt::Display for TriggerPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            PatternKind::Exact => "exact",
            PatternKind::Prefix => "prefix",
            PatternKind::TokenSet => "tokens",
        };
        write!(f, "{}:\"{}\"", kind, self.text())
    }
}

/// Memory mutation requested by a skill. Applied by the engine in order after execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MemoryWrite {
    /// Replace all versions of `key` with `content`.
    Put { key: String, content: serde_json::Value },
    /// Add a new version of `key`.
    Append { key: String, content: serde_json::Value },
    /// Delete every version of `key`.
    Remove { key: String },
}

/// Side effect the host application performs (exit, power actions). The core never runs these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostAction {
    pub name: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub args: serde_json::Value,
}

impl HostAction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: serde_json::Value::Null,
        }
    }
}

/// Uniform result of a skill execution, consumed by the overlay/TTS layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillResult {
    /// Text for speech output.
    #[serde(default)]
    pub speak_text: String,
    /// Short text for the overlay.
    #[serde(default)]
    pub hud_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<HostAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memory_writes: Vec<MemoryWrite>,
    /// Skill-specific structured payload.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl SkillResult {
    pub fn say(speak_text: impl Into<String>) -> Self {
        Self {
            speak_text: speak_text.into(),
            ..Self::default()
        }
    }

    pub fn with_hud(mut self, hud_text: impl Into<String>) -> Self {
        self.hud_text = hud_text.into();
        self
    }

    pub fn with_action(mut self, action: HostAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_write(mut self, write: MemoryWrite) -> Self {
        self.memory_writes.push(write);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Classification of a failed execution, carried in `DecisionOutcome::Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Io,
    Storage,
    Execution,
    /// The capability panicked; the engine caught it.
    Panicked,
    /// The skill was unregistered between confirmation request and approval.
    Unavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Io => "io",
            ErrorKind::Storage => "storage",
            ErrorKind::Execution => "execution",
            ErrorKind::Panicked => "panicked",
            ErrorKind::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a skill's capability.
#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error("skill execution failed: {0}")]
    Execution(String),
}

impl SkillError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SkillError::InvalidInput(_) => ErrorKind::InvalidInput,
            SkillError::NotFound(_) => ErrorKind::NotFound,
            SkillError::Io(_) => ErrorKind::Io,
            SkillError::Memory(MemoryError::NotFound(_)) => ErrorKind::NotFound,
            SkillError::Memory(_) => ErrorKind::Storage,
            SkillError::Execution(_) => ErrorKind::Execution,
        }
    }
}

/// What a skill sees of the current decision cycle.
#[derive(Debug, Clone, Copy)]
pub struct SkillInput<'a> {
    normalized: &'a NormalizedInput,
    matched: &'a TriggerPattern,
}

impl<'a> SkillInput<'a> {
    pub fn new(normalized: &'a NormalizedInput, matched: &'a TriggerPattern) -> Self {
        Self { normalized, matched }
    }

    /// Original raw input as typed or transcribed.
    pub fn raw(&self) -> &'a str {
        self.normalized.raw()
    }

    pub fn normalized(&self) -> &'a NormalizedInput {
        self.normalized
    }

    /// The trigger pattern that selected this skill.
    pub fn matched(&self) -> &'a TriggerPattern {
        self.matched
    }

    /// Normalized text after the matched prefix (empty for exact and token-set matches).
    pub fn argument(&self) -> String {
        match self.matched.kind() {
            PatternKind::Prefix => self.normalized.rest_after(self.matched.tokens().len()),
            _ => String::new(),
        }
    }

    /// Raw text after the matched prefix, case preserved (paths, titles).
    pub fn raw_argument(&self) -> &'a str {
        match self.matched.kind() {
            PatternKind::Prefix => self.normalized.raw_after_tokens(self.matched.tokens().len()),
            _ => "",
        }
    }
}

/// Trait implemented by every capability the engine can dispatch.
#[async_trait::async_trait]
pub trait Skill: Send + Sync {
    /// Unique skill name (registry identity).
    fn name(&self) -> &str;

    /// Human-readable description, used by the help skill.
    fn description(&self) -> &str {
        ""
    }

    /// Ordered trigger patterns.
    fn triggers(&self) -> Vec<TriggerPattern>;

    /// Whether execution requires explicit human confirmation.
    fn sensitive(&self) -> bool {
        false
    }

    /// Runs the capability against one input. Runs to completion; the core never preempts it.
    async fn execute(
        &self,
        input: &SkillInput<'_>,
        memory: &MemoryReader<'_>,
    ) -> Result<SkillResult, SkillError>;
}

/// Registration record: an immutable snapshot of a skill's identity and triggers.
#[derive(Clone)]
pub struct SkillDescriptor {
    name: String,
    description: String,
    patterns: Vec<TriggerPattern>,
    sensitive: bool,
    capability: Arc<dyn Skill>,
}

impl SkillDescriptor {
    /// Snapshots `skill`'s name, triggers, and sensitivity.
    pub fn of(skill: Arc<dyn Skill>) -> Self {
        Self {
            name: skill.name().to_string(),
            description: skill.description().to_string(),
            patterns: skill.triggers(),
            sensitive: skill.sensitive(),
            capability: skill,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn patterns(&self) -> &[TriggerPattern] {
        &self.patterns
    }

    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    pub fn capability(&self) -> &Arc<dyn Skill> {
        &self.capability
    }
}

impl fmt::Debug for SkillDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkillDescriptor")
            .field("name", &self.name)
            .field("patterns", &self.patterns)
            .field("sensitive", &self.sensitive)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_are_normalized() {
        let p = TriggerPattern::prefix("  Read   FILE ");
        assert_eq!(p.text(), "read file");
        assert_eq!(p.len_chars(), 9);
        assert!(TriggerPattern::exact("?!").is_empty());
    }

    #[test]
    fn token_set_dedupes() {
        let p = TriggerPattern::token_set("notes delete notes");
        assert_eq!(p.tokens(), ["notes", "delete"]);
    }

    #[test]
    fn arguments_follow_prefix() {
        let input = NormalizedInput::parse("Remember Car Colour as RED").unwrap();
        let pattern = TriggerPattern::prefix("remember");
        let si = SkillInput::new(&input, &pattern);
        assert_eq!(si.argument(), "car colour as red");
        assert_eq!(si.raw_argument(), "Car Colour as RED");

        let exact = TriggerPattern::exact("remember car colour as red");
        assert_eq!(SkillInput::new(&input, &exact).argument(), "");
    }

    #[test]
    fn memory_not_found_maps_to_not_found_kind() {
        let err = SkillError::from(MemoryError::NotFound("x".into()));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = SkillError::from(MemoryError::StorageUnavailable("disk".into()));
        assert_eq!(err.kind(), ErrorKind::Storage);
    }
}
