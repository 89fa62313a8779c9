//! Facts memory: `remember X as Y`, `what do you know about X`, `forget X`.
//!
//! Each fact lives under its own memory key, `fact/<normalized subject>`, and is replaced
//! (not versioned) when remembered again.

use evo_core::{
    normalize_phrase, MemoryError, MemoryReader, MemoryWrite, Skill, SkillError, SkillInput, SkillResult,
    TriggerPattern,
};
use once_cell::sync::Lazy;
use regex::Regex;

pub const FACT_PREFIX: &str = "fact/";

/// `<subject> as <value>`
static AS_FORM: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?is)^(.+?)\s+as\s+(.+)$").ok());
/// `<subject>: <value>`
static COLON_FORM: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?s)^(.+?)\s*:\s*(.+)$").ok());

/// Memory key for a fact subject. `None` when the subject normalizes to nothing.
pub fn fact_key(subject: &str) -> Option<String> {
    let subject = normalize_phrase(subject);
    (!subject.is_empty()).then(|| format!("{}{}", FACT_PREFIX, subject))
}

fn parse_fact(argument: &str) -> Option<(String, String)> {
    for form in [&*AS_FORM, &*COLON_FORM] {
        let Some(re) = form else {
            continue;
        };
        if let Some(caps) = re.captures(argument) {
            let subject = caps.get(1)?.as_str().trim();
            let value = caps.get(2)?.as_str().trim().trim_end_matches('.');
            if !subject.is_empty() && !value.is_empty() {
                return Some((subject.to_string(), value.to_string()));
            }
        }
    }
    None
}

fn subject_key(input: &SkillInput<'_>, usage: &str) -> Result<(String, String), SkillError> {
    let subject = input.argument();
    let key = fact_key(&subject).ok_or_else(|| SkillError::InvalidInput(usage.to_string()))?;
    Ok((subject, key))
}

pub struct RememberFact;

#[async_trait::async_trait]
impl Skill for RememberFact {
    fn name(&self) -> &str {
        "remember_fact"
    }

    fn description(&self) -> &str {
        "remember X as Y, or remember X: Y"
    }

    fn triggers(&self) -> Vec<TriggerPattern> {
        vec![TriggerPattern::prefix("remember")]
    }

    async fn execute(&self, input: &SkillInput<'_>, _memory: &MemoryReader<'_>) -> Result<SkillResult, SkillError> {
        let (subject, value) = parse_fact(input.raw_argument())
            .ok_or_else(|| SkillError::InvalidInput("say: remember X as Y".to_string()))?;
        let key = fact_key(&subject).ok_or_else(|| SkillError::InvalidInput("say: remember X as Y".to_string()))?;
        let subject = normalize_phrase(&subject);

        tracing::debug!(target: "evo::skills", key = %key, "fact remembered");
        Ok(SkillResult::say(format!("Noted: {} is {}.", subject, value))
            .with_hud(format!("Memory: {}", subject))
            .with_write(MemoryWrite::Put {
                key,
                content: serde_json::Value::String(value),
            }))
    }
}

pub struct RecallFact;

#[async_trait::async_trait]
impl Skill for RecallFact {
    fn name(&self) -> &str {
        "recall_fact"
    }

    fn description(&self) -> &str {
        "what do you know about X"
    }

    fn triggers(&self) -> Vec<TriggerPattern> {
        vec![TriggerPattern::prefix("what do you know about")]
    }

    async fn execute(&self, input: &SkillInput<'_>, memory: &MemoryReader<'_>) -> Result<SkillResult, SkillError> {
        let (subject, key) = subject_key(input, "say: what do you know about X")?;
        match memory.get(&key) {
            Ok(value) => {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                Ok(SkillResult::say(format!("{} is {}.", subject, value))
                    .with_hud(format!("Memory: {}", subject))
                    .with_data(serde_json::json!({ "key": key, "value": value })))
            }
            Err(MemoryError::NotFound(_)) => Ok(SkillResult::say(format!("I don't know anything about {}.", subject))
                .with_hud(format!("Memory: nothing on {}", subject))),
            Err(e) => Err(e.into()),
        }
    }
}

/// Always confirmed first, even when nothing is stored: sensitivity is fixed at registration.
pub struct ForgetFact;

#[async_trait::async_trait]
impl Skill for ForgetFact {
    fn name(&self) -> &str {
        "forget_fact"
    }

    fn description(&self) -> &str {
        "forget X"
    }

    fn triggers(&self) -> Vec<TriggerPattern> {
        vec![TriggerPattern::prefix("forget")]
    }

    fn sensitive(&self) -> bool {
        true
    }

    async fn execute(&self, input: &SkillInput<'_>, memory: &MemoryReader<'_>) -> Result<SkillResult, SkillError> {
        let (subject, key) = subject_key(input, "say: forget X")?;
        match memory.latest_record(&key) {
            Ok(_) => Ok(SkillResult::say(format!("Forgotten: {}.", subject))
                .with_hud(format!("Memory: removed {}", subject))
                .with_write(MemoryWrite::Remove { key })),
            Err(MemoryError::NotFound(_)) => Ok(SkillResult::say(format!("There was nothing stored about {}.", subject))
                .with_hud(format!("Memory: nothing on {}", subject))),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_forms() {
        assert_eq!(
            parse_fact("Car Colour as Dark Red."),
            Some(("Car Colour".to_string(), "Dark Red".to_string()))
        );
        assert_eq!(
            parse_fact("wifi password: hunter2"),
            Some(("wifi password".to_string(), "hunter2".to_string()))
        );
        assert_eq!(parse_fact("nothing useful"), None);
        assert_eq!(parse_fact(" as x"), None);
    }

    #[test]
    fn fact_keys_are_normalized() {
        assert_eq!(fact_key("  Cor do Carro "), Some("fact/cor do carro".to_string()));
        assert_eq!(fact_key("?"), None);
    }
}
