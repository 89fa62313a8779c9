//! EVO configuration: defaults, optional config file, then `EVO__*` environment overrides.
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | app_name | EVO | Identity used in logs. |
//! | storage_path | ./data/evo_memory | Sled directory for the memory store. |
//! | confirm_timeout_secs | 8 | How long a sensitive action waits for approval. |
//! | confirm_words | confirm, yes, ok | Host-side words answered as approve. |
//! | cancel_words | cancel, no, stop | Host-side words answered as deny. |
//! | read_file_max_bytes | 200000 | Size cap for the read-file skill. |
//! | read_file_extensions | txt, md, json, log, csv | Extensions the read-file skill accepts. |
//! | record_interactions | true | Persist one memory record per decision cycle. |
//! | interactions_key | evo/interactions | Memory key receiving the interaction records. |
//! | interaction_history_limit | 1000 | Newest interaction records kept (0 keeps all). |

use crate::input::normalize_phrase;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_app_name() -> String {
    "EVO".to_string()
}

fn default_storage_path() -> String {
    "./data/evo_memory".to_string()
}

fn default_confirm_timeout_secs() -> u64 {
    8
}

fn default_confirm_words() -> Vec<String> {
    ["confirm", "yes", "ok"].iter().map(|s| s.to_string()).collect()
}

fn default_cancel_words() -> Vec<String> {
    ["cancel", "no", "stop"].iter().map(|s| s.to_string()).collect()
}

fn default_read_file_max_bytes() -> u64 {
    200_000
}

fn default_read_file_extensions() -> Vec<String> {
    ["txt", "md", "json", "log", "csv"].iter().map(|s| s.to_string()).collect()
}

fn default_true() -> bool {
    true
}

fn default_interactions_key() -> String {
    crate::engine::INTERACTIONS_KEY.to_string()
}

fn default_interaction_history_limit() -> usize {
    1000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvoConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,
    #[serde(default = "default_confirm_words")]
    pub confirm_words: Vec<String>,
    #[serde(default = "default_cancel_words")]
    pub cancel_words: Vec<String>,
    #[serde(default = "default_read_file_max_bytes")]
    pub read_file_max_bytes: u64,
    #[serde(default = "default_read_file_extensions")]
    pub read_file_extensions: Vec<String>,
    #[serde(default = "default_true")]
    pub record_interactions: bool,
    #[serde(default = "default_interactions_key")]
    pub interactions_key: String,
    #[serde(default = "default_interaction_history_limit")]
    pub interaction_history_limit: usize,
}

impl Default for EvoConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            storage_path: default_storage_path(),
            confirm_timeout_secs: default_confirm_timeout_secs(),
            confirm_words: default_confirm_words(),
            cancel_words: default_cancel_words(),
            read_file_max_bytes: default_read_file_max_bytes(),
            read_file_extensions: default_read_file_extensions(),
            record_interactions: true,
            interactions_key: default_interactions_key(),
            interaction_history_limit: default_interaction_history_limit(),
        }
    }
}

impl EvoConfig {
    /// Load config. Precedence: `EVO__*` env > file at `$EVO_CONFIG` (default `config/evo`) > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("EVO_CONFIG").unwrap_or_else(|_| "config/evo".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Same as [`load`](Self::load) with an explicit file path (extension optional; missing file is fine).
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let built = config::Config::builder()
            .add_source(config::File::with_name(&path.to_string_lossy()).required(false))
            .add_source(
                config::Environment::with_prefix("EVO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        built.try_deserialize()
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    /// True when `text` normalizes to one of the confirm words.
    pub fn is_confirm_word(&self, text: &str) -> bool {
        word_in(text, &self.confirm_words)
    }

    /// True when `text` normalizes to one of the cancel words.
    pub fn is_cancel_word(&self, text: &str) -> bool {
        word_in(text, &self.cancel_words)
    }
}

fn word_in(text: &str, words: &[String]) -> bool {
    let t = normalize_phrase(text);
    !t.is_empty() && words.iter().any(|w| normalize_phrase(w) == t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EvoConfig::load_from(&dir.path().join("absent")).unwrap();
        assert_eq!(cfg.confirm_timeout_secs, 8);
        assert_eq!(cfg.app_name, "EVO");
        assert!(cfg.record_interactions);
        assert_eq!(cfg.interactions_key, "evo/interactions");
        assert_eq!(cfg.interaction_history_limit, 1000);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evo.toml");
        std::fs::write(
            &path,
            "confirm_timeout_secs = 20\ninteraction_history_limit = 50\nconfirm_words = [\"confirmo\", \"sim\"]\nstorage_path = \"/tmp/evo\"\n",
        )
        .unwrap();
        let cfg = EvoConfig::load_from(&path).unwrap();
        assert_eq!(cfg.confirm_timeout(), Duration::from_secs(20));
        assert_eq!(cfg.storage_path, "/tmp/evo");
        assert_eq!(cfg.interaction_history_limit, 50);
        assert!(cfg.is_confirm_word("Confirmo!"));
        assert!(!cfg.is_confirm_word("yes"));
        assert!(cfg.is_cancel_word("no"));
    }

    #[test]
    fn words_are_normalized() {
        let cfg = EvoConfig {
            cancel_words: vec!["Não".to_string()],
            ..EvoConfig::default()
        };
        assert!(cfg.is_cancel_word("  nao "));
        assert!(!cfg.is_cancel_word(""));
    }
}
