//! App and power commands. These only name a host action; the host performs it.

use evo_core::{HostAction, MemoryReader, Skill, SkillError, SkillInput, SkillResult, TriggerPattern};

pub struct AppExit;

#[async_trait::async_trait]
impl Skill for AppExit {
    fn name(&self) -> &str {
        "app_exit"
    }

    fn description(&self) -> &str {
        "exit, quit, close evo"
    }

    fn triggers(&self) -> Vec<TriggerPattern> {
        vec![
            TriggerPattern::exact("exit"),
            TriggerPattern::exact("quit"),
            TriggerPattern::exact("close evo"),
        ]
    }

    async fn execute(&self, _input: &SkillInput<'_>, _memory: &MemoryReader<'_>) -> Result<SkillResult, SkillError> {
        Ok(SkillResult::say("Shutting down.")
            .with_hud("Exit")
            .with_action(HostAction::new("app.exit")))
    }
}

pub struct Power;

#[async_trait::async_trait]
impl Skill for Power {
    fn name(&self) -> &str {
        "power"
    }

    fn description(&self) -> &str {
        "sleep, suspend, lock"
    }

    fn triggers(&self) -> Vec<TriggerPattern> {
        vec![
            TriggerPattern::exact("sleep"),
            TriggerPattern::exact("suspend"),
            TriggerPattern::exact("lock"),
        ]
    }

    async fn execute(&self, input: &SkillInput<'_>, _memory: &MemoryReader<'_>) -> Result<SkillResult, SkillError> {
        let (action, speak) = match input.matched().text().as_str() {
            "lock" => ("power.lock", "Session locked."),
            "suspend" => ("power.sleep", "Suspending."),
            _ => ("power.sleep", "Going to sleep."),
        };
        Ok(SkillResult::say(speak).with_hud(speak).with_action(HostAction::new(action)))
    }
}

pub struct Hibernate;

#[async_trait::async_trait]
impl Skill for Hibernate {
    fn name(&self) -> &str {
        "hibernate"
    }

    fn description(&self) -> &str {
        "hibernate"
    }

    fn triggers(&self) -> Vec<TriggerPattern> {
        vec![TriggerPattern::exact("hibernate"), TriggerPattern::exact("shut down")]
    }

    fn sensitive(&self) -> bool {
        true
    }

    async fn execute(&self, _input: &SkillInput<'_>, _memory: &MemoryReader<'_>) -> Result<SkillResult, SkillError> {
        Ok(SkillResult::say("Hibernating.")
            .with_hud("Hibernate")
            .with_action(HostAction::new("power.hibernate")))
    }
}
