//! Read a local text file and keep it as a note.
//!
//! Only allow-listed extensions under a size cap are read. The content is appended to the
//! notes key with a `[FILE] <path>` header so later queries can tell where it came from.
//! Paths may use `~`, `$VAR`, `${VAR}` and `%VAR%`; they are expanded before resolving.

use crate::notes::NOTES_KEY;
use crate::text::{preview, FILE_HEADER};
use evo_core::{EvoConfig, MemoryReader, MemoryWrite, Skill, SkillError, SkillInput, SkillResult, TriggerPattern};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};

/// `${NAME}`, `$NAME` or `%NAME%`.
static ENV_REF: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\$\{(\w+)\}|\$(\w+)|%(\w+)%").ok());

const PREVIEW_CHARS: usize = 420;

pub struct ReadFile {
    max_bytes: u64,
    /// Lower-case extensions without the dot.
    extensions: Vec<String>,
}

impl ReadFile {
    pub fn new(max_bytes: u64, extensions: &[String]) -> Self {
        Self {
            max_bytes,
            extensions: extensions
                .iter()
                .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &EvoConfig) -> Self {
        Self::new(config.read_file_max_bytes, &config.read_file_extensions)
    }

    fn allowed(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|a| a.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

/// Expands environment references and a leading `~`. Unknown variables are left as written.
fn expand_path(raw: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let expanded = match &*ENV_REF {
        Some(re) => re
            .replace_all(raw, |caps: &Captures| {
                let name = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3));
                name.and_then(|n| lookup(n.as_str())).unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned(),
        None => raw.to_string(),
    };

    let home_relative = expanded == "~" || expanded.starts_with("~/") || expanded.starts_with("~\\");
    if !home_relative {
        return expanded;
    }
    match lookup("HOME").or_else(|| lookup("USERPROFILE")) {
        Some(home) => format!("{}{}", home, &expanded[1..]),
        None => expanded,
    }
}

/// Strips one pair of surrounding quotes, expands `~` and variables, and resolves relative
/// paths against the cwd.
fn resolve_path(argument: &str) -> Option<PathBuf> {
    let trimmed = argument.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| trimmed.strip_prefix(*q).and_then(|s| s.strip_suffix(*q)))
        .unwrap_or(trimmed)
        .trim();
    if unquoted.is_empty() {
        return None;
    }
    let expanded = expand_path(unquoted, |name| std::env::var(name).ok());
    let path = PathBuf::from(&expanded);
    if path.is_absolute() {
        return Some(path);
    }
    std::env::current_dir().ok().map(|cwd| cwd.join(&path)).or(Some(path))
}

/// UTF-8 first, Latin-1 as the fallback (common for files saved on Windows).
fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

#[async_trait::async_trait]
impl Skill for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "read file <path>, or open <path>"
    }

    fn triggers(&self) -> Vec<TriggerPattern> {
        vec![TriggerPattern::prefix("read file"), TriggerPattern::prefix("open")]
    }

    async fn execute(&self, input: &SkillInput<'_>, _memory: &MemoryReader<'_>) -> Result<SkillResult, SkillError> {
        let path = resolve_path(input.raw_argument())
            .ok_or_else(|| SkillError::InvalidInput("say which file: read file <path>".to_string()))?;
        let shown = path.display().to_string();

        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SkillError::NotFound(format!("file {}", shown)));
            }
            Err(e) => return Err(e.into()),
        };
        if meta.is_dir() {
            return Err(SkillError::InvalidInput(format!("{} is a folder; only files can be read", shown)));
        }
        if !self.allowed(&path) {
            return Err(SkillError::InvalidInput(format!(
                "only these extensions are read: {}",
                self.extensions.join(", ")
            )));
        }
        if meta.len() > self.max_bytes {
            return Err(SkillError::InvalidInput(format!(
                "file is too large ({} bytes, limit {})",
                meta.len(),
                self.max_bytes
            )));
        }

        let content = decode(tokio::fs::read(&path).await?);
        let lines = content.lines().count();
        let chars = content.chars().count();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| shown.clone());

        tracing::info!(target: "evo::skills", path = %shown, bytes = meta.len(), lines, "file read into notes");
        let note = format!("{} {}\n{}", FILE_HEADER, shown, content);
        Ok(SkillResult::say(format!(
            "Read the file. {} lines, {} characters. Saved to memory. Preview: {}",
            lines,
            chars,
            preview(&content, PREVIEW_CHARS)
        ))
        .with_hud(format!("Read and saved: {}", name))
        .with_write(MemoryWrite::Append {
            key: NOTES_KEY.to_string(),
            content: serde_json::json!({ "source": shown, "text": note }),
        })
        .with_data(serde_json::json!({
            "path": shown,
            "bytes": meta.len(),
            "lines": lines,
            "chars": chars,
        })))
    }
}
