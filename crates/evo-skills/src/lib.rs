//! Concrete EVO skills and the explicit startup registry.
//!
//! Every skill is a plain value implementing [`evo_core::Skill`]. [`default_registry`]
//! assembles them in a fixed order, so registration order (the last tie-break) is the same
//! on every start.

mod facts;
mod files;
mod help;
mod notes;
mod system;
mod text;

pub use facts::{fact_key, ForgetFact, RecallFact, RememberFact, FACT_PREFIX};
pub use files::ReadFile;
pub use help::Help;
pub use notes::{ClearNotes, NotesQuery, NOTES_KEY};
pub use system::{AppExit, Hibernate, Power};

use evo_core::{EvoConfig, RegistrationError, Skill, SkillRegistry};
use std::sync::Arc;

/// The bundled skills, help excluded, in registration order.
pub fn bundled_skills(config: &EvoConfig) -> Vec<Arc<dyn Skill>> {
    vec![
        Arc::new(RememberFact),
        Arc::new(RecallFact),
        Arc::new(ForgetFact),
        Arc::new(ReadFile::from_config(config)),
        Arc::new(NotesQuery),
        Arc::new(ClearNotes),
        Arc::new(AppExit),
        Arc::new(Power),
        Arc::new(Hibernate),
    ]
}

/// Builds the registry the daemon runs with: help first, then [`bundled_skills`].
pub fn default_registry(config: &EvoConfig) -> Result<SkillRegistry, RegistrationError> {
    let skills = bundled_skills(config);
    let help = Help::for_skills(&skills);

    let mut registry = SkillRegistry::new();
    registry.register_skill(Arc::new(help))?;
    for skill in skills {
        registry.register_skill(skill)?;
    }
    tracing::info!(target: "evo::skills", skills = registry.len(), "default registry assembled");
    Ok(registry)
}
