//! Skill registry: explicit, typed registration and deterministic candidate matching.
//!
//! Precedence, highest first:
//! 1. match class: exact full phrase > token-boundary prefix > token subset,
//! 2. length of the matched pattern (longer is more specific),
//! 3. registration order (only orders equal scores; equal top scores are still ambiguous).
//!
//! There is no fuzzy or edit-distance matching.

use crate::input::NormalizedInput;
use crate::skills::{PatternKind, Skill, SkillDescriptor, TriggerPattern};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Weight of one match class; pattern length is added below it.
const CLASS_WEIGHT: u64 = 1_000_000;
const MAX_LENGTH_BONUS: u64 = CLASS_WEIGHT - 1;

/// Registration failures. Fatal for the skill being registered; the registry is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("skill '{0}' is already registered")]
    DuplicateSkill(String),
    #[error("skill '{name}' has an invalid trigger list: {reason}")]
    InvalidPattern { name: String, reason: String },
    #[error("skill name must not be empty")]
    InvalidName,
}

/// Match class of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    TokenSubset = 1,
    Prefix = 2,
    Exact = 3,
}

/// Integer match score: class weight plus matched pattern length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Score(pub u64);

impl Score {
    fn of(kind: MatchKind, pattern: &TriggerPattern) -> Self {
        let length = (pattern.len_chars() as u64).min(MAX_LENGTH_BONUS);
        Score(kind as u64 * CLASS_WEIGHT + length)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A skill whose trigger matched the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchCandidate {
    pub skill: String,
    pub score: Score,
    pub kind: MatchKind,
    pub pattern: TriggerPattern,
    pub sensitive: bool,
}

/// Ranked candidates for one input: finite, consumed once.
#[derive(Debug)]
pub struct Candidates {
    inner: std::vec::IntoIter<MatchCandidate>,
}

impl Iterator for Candidates {
    type Item = MatchCandidate;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Candidates {}

struct Entry {
    seq: u64,
    descriptor: SkillDescriptor,
}

/// Registry of skills, constructed explicitly and handed to the engine.
#[derive(Default)]
pub struct SkillRegistry {
    entries: Vec<Entry>,
    next_seq: u64,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor. Duplicate names and empty/invalid trigger lists are rejected
    /// and leave the registry unchanged (the first registration is retained).
    pub fn register(&mut self, descriptor: SkillDescriptor) -> Result<(), RegistrationError> {
        let name = descriptor.name().to_string();
        if name.trim().is_empty() {
            return Err(RegistrationError::InvalidName);
        }
        if self.get(&name).is_some() {
            tracing::warn!(target: "evo::registry", skill = %name, "duplicate skill registration rejected");
            return Err(RegistrationError::DuplicateSkill(name));
        }
        if descriptor.patterns().is_empty() {
            return Err(RegistrationError::InvalidPattern {
                name,
                reason: "no trigger patterns".to_string(),
            });
        }
        if let Some(i) = descriptor.patterns().iter().position(TriggerPattern::is_empty) {
            return Err(RegistrationError::InvalidPattern {
                name,
                reason: format!("pattern #{} is empty after normalization", i + 1),
            });
        }

        tracing::info!(
            target: "evo::registry",
            skill = %name,
            patterns = descriptor.patterns().len(),
            sensitive = descriptor.is_sensitive(),
            "skill registered"
        );
        self.entries.push(Entry {
            seq: self.next_seq,
            descriptor,
        });
        self.next_seq += 1;
        Ok(())
    }

    /// Snapshots and registers a skill value.
    pub fn register_skill(&mut self, skill: Arc<dyn Skill>) -> Result<(), RegistrationError> {
        self.register(SkillDescriptor::of(skill))
    }

    /// Removes a skill by name. Idempotent; returns whether something was removed.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.descriptor.name() != name);
        let removed = self.entries.len() != before;
        if removed {
            tracing::info!(target: "evo::registry", skill = %name, "skill unregistered");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<&SkillDescriptor> {
        self.entries.iter().find(|e| e.descriptor.name() == name).map(|e| &e.descriptor)
    }

    /// Names in registration order.
    pub fn skill_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.descriptor.name().to_string()).collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &SkillDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ranks every skill with at least one matching pattern against `input`.
    ///
    /// Ordered by descending score, then registration order. Empty when nothing matches.
    pub fn match_input(&self, input: &NormalizedInput) -> Candidates {
        let mut scored: Vec<(u64, MatchCandidate)> = self
            .entries
            .iter()
            .filter_map(|entry| best_match(&entry.descriptor, input).map(|c| (entry.seq, c)))
            .collect();
        scored.sort_by(|(seq_a, a), (seq_b, b)| b.score.cmp(&a.score).then(seq_a.cmp(seq_b)));
        let ranked: Vec<MatchCandidate> = scored.into_iter().map(|(_, c)| c).collect();

        tracing::debug!(
            target: "evo::registry",
            input = %input.text(),
            candidates = ranked.len(),
            "input matched"
        );
        Candidates {
            inner: ranked.into_iter(),
        }
    }
}

/// Highest-scoring pattern of one descriptor; the earlier pattern wins an equal score.
fn best_match(descriptor: &SkillDescriptor, input: &NormalizedInput) -> Option<MatchCandidate> {
    let mut best: Option<(Score, MatchKind, &TriggerPattern)> = None;
    for pattern in descriptor.patterns() {
        let Some(kind) = classify(pattern, input) else {
            continue;
        };
        let score = Score::of(kind, pattern);
        if best.map_or(true, |(s, _, _)| score > s) {
            best = Some((score, kind, pattern));
        }
    }
    best.map(|(score, kind, pattern)| MatchCandidate {
        skill: descriptor.name().to_string(),
        score,
        kind,
        pattern: pattern.clone(),
        sensitive: descriptor.is_sensitive(),
    })
}

/// Match class of one pattern against the input, if any.
fn classify(pattern: &TriggerPattern, input: &NormalizedInput) -> Option<MatchKind> {
    if pattern.is_empty() {
        return None;
    }
    if pattern.tokens() == input.tokens() {
        return Some(MatchKind::Exact);
    }
    match pattern.kind() {
        PatternKind::Exact => None,
        PatternKind::Prefix => input.starts_with_tokens(pattern.tokens()).then_some(MatchKind::Prefix),
        PatternKind::TokenSet => pattern
            .tokens()
            .iter()
            .all(|t| input.tokens().contains(t))
            .then_some(MatchKind::TokenSubset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryReader;
    use crate::skills::{SkillError, SkillInput, SkillResult};

    struct Fixed {
        name: &'static str,
        triggers: Vec<TriggerPattern>,
    }

    #[async_trait::async_trait]
    impl Skill for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn triggers(&self) -> Vec<TriggerPattern> {
            self.triggers.clone()
        }

        async fn execute(
            &self,
            _input: &SkillInput<'_>,
            _memory: &MemoryReader<'_>,
        ) -> Result<SkillResult, SkillError> {
            Ok(SkillResult::say(self.name))
        }
    }

    fn skill(name: &'static str, triggers: Vec<TriggerPattern>) -> Arc<dyn Skill> {
        Arc::new(Fixed { name, triggers })
    }

    fn ranked(registry: &SkillRegistry, text: &str) -> Vec<String> {
        let input = NormalizedInput::parse(text).unwrap();
        registry.match_input(&input).map(|c| c.skill).collect()
    }

    #[test]
    fn exact_beats_prefix() {
        let mut r = SkillRegistry::new();
        r.register_skill(skill("open", vec![TriggerPattern::prefix("open")])).unwrap();
        r.register_skill(skill("open_file", vec![TriggerPattern::exact("open file")])).unwrap();
        assert_eq!(ranked(&r, "open file"), ["open_file", "open"]);
    }

    #[test]
    fn longer_prefix_wins() {
        let mut r = SkillRegistry::new();
        r.register_skill(skill("short", vec![TriggerPattern::prefix("open")])).unwrap();
        r.register_skill(skill("long", vec![TriggerPattern::prefix("open file")])).unwrap();
        let input = NormalizedInput::parse("open file notes.txt").unwrap();
        let c: Vec<_> = r.match_input(&input).collect();
        assert_eq!(c[0].skill, "long");
        assert!(c[0].score > c[1].score);
        assert_eq!(c[0].kind, MatchKind::Prefix);
    }

    #[test]
    fn prefix_beats_token_subset() {
        let mut r = SkillRegistry::new();
        r.register_skill(skill("subset", vec![TriggerPattern::token_set("notes delete all")])).unwrap();
        r.register_skill(skill("prefix", vec![TriggerPattern::prefix("delete")])).unwrap();
        assert_eq!(ranked(&r, "delete all my notes"), ["prefix", "subset"]);
    }

    #[test]
    fn equal_scores_keep_registration_order() {
        let mut r = SkillRegistry::new();
        r.register_skill(skill("a", vec![TriggerPattern::exact("help")])).unwrap();
        r.register_skill(skill("b", vec![TriggerPattern::exact("help")])).unwrap();
        let input = NormalizedInput::parse("help").unwrap();
        let c: Vec<_> = r.match_input(&input).collect();
        assert_eq!(c.len(), 2);
        assert_eq!(c[0].skill, "a");
        assert_eq!(c[0].score, c[1].score);
    }

    #[test]
    fn descriptor_score_is_max_over_its_patterns() {
        let mut r = SkillRegistry::new();
        r.register_skill(skill(
            "multi",
            vec![TriggerPattern::token_set("file"), TriggerPattern::exact("read file")],
        ))
        .unwrap();
        let input = NormalizedInput::parse("read file").unwrap();
        let c: Vec<_> = r.match_input(&input).collect();
        assert_eq!(c[0].kind, MatchKind::Exact);
        assert_eq!(c[0].pattern.text(), "read file");
    }

    #[test]
    fn duplicate_and_invalid_registrations_fail() {
        let mut r = SkillRegistry::new();
        r.register_skill(skill("x", vec![TriggerPattern::exact("one")])).unwrap();
        assert_eq!(
            r.register_skill(skill("x", vec![TriggerPattern::exact("two")])),
            Err(RegistrationError::DuplicateSkill("x".into()))
        );
        assert_eq!(ranked(&r, "one"), ["x"]);
        assert!(ranked(&r, "two").is_empty());

        assert!(matches!(
            r.register_skill(skill("empty", vec![])),
            Err(RegistrationError::InvalidPattern { .. })
        ));
        assert!(matches!(
            r.register_skill(skill("blank", vec![TriggerPattern::exact("  ")])),
            Err(RegistrationError::InvalidPattern { .. })
        ));
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut r = SkillRegistry::new();
        r.register_skill(skill("x", vec![TriggerPattern::exact("one")])).unwrap();
        assert!(r.unregister("x"));
        assert!(!r.unregister("x"));
        assert!(r.is_empty());
    }

    #[test]
    fn no_match_is_empty() {
        let mut r = SkillRegistry::new();
        r.register_skill(skill("x", vec![TriggerPattern::prefix("open")])).unwrap();
        assert!(ranked(&r, "opening").is_empty());
    }
}
