use evo_core::{MemoryReader, Skill, SkillError, SkillInput, SkillResult, TriggerPattern};
use std::sync::Arc;

/// Lists what the assistant can do. The list is snapshotted from the other skills at startup.
pub struct Help {
    lines: Vec<String>,
}

impl Help {
    pub fn for_skills(skills: &[Arc<dyn Skill>]) -> Self {
        let lines = skills
            .iter()
            .filter(|s| !s.description().is_empty())
            .map(|s| {
                if s.sensitive() {
                    format!("{} (asks for confirmation)", s.description())
                } else {
                    s.description().to_string()
                }
            })
            .collect();
        Self { lines }
    }
}

#[async_trait::async_trait]
impl Skill for Help {
    fn name(&self) -> &str {
        "help"
    }

    fn description(&self) -> &str {
        "help: list commands"
    }

    fn triggers(&self) -> Vec<TriggerPattern> {
        vec![
            TriggerPattern::exact("help"),
            TriggerPattern::exact("commands"),
            TriggerPattern::exact("what can you do"),
        ]
    }

    async fn execute(&self, _input: &SkillInput<'_>, _memory: &MemoryReader<'_>) -> Result<SkillResult, SkillError> {
        let mut speak = String::from("I run direct commands and keep a local memory. Commands:");
        for line in &self.lines {
            speak.push_str(" • ");
            speak.push_str(line);
            speak.push('.');
        }
        Ok(SkillResult::say(speak)
            .with_hud("Help: available commands")
            .with_data(serde_json::json!({ "commands": self.lines })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AppExit, Hibernate};

    #[test]
    fn sensitive_skills_are_flagged() {
        let skills: Vec<Arc<dyn Skill>> = vec![Arc::new(AppExit), Arc::new(Hibernate)];
        let help = Help::for_skills(&skills);
        assert_eq!(help.lines.len(), 2);
        assert!(!help.lines[0].contains("confirmation"));
        assert!(help.lines[1].ends_with("(asks for confirmation)"));
    }
}
