//! Notes: summaries and literal search over what `read_file` stored, and clearing them.

use crate::text::{contains_ignore_case, excerpt_around, preview, strip_file_header, summarize};
use evo_core::{MemoryReader, MemoryRecord, MemoryWrite, Skill, SkillError, SkillInput, SkillResult, TriggerPattern};

/// Memory key holding every note, one version per note.
pub const NOTES_KEY: &str = "notes";

/// Only the most recent notes are searched.
const RECENT_NOTES: usize = 50;
const SEARCH_HITS: usize = 3;
const TOPIC_HITS: usize = 4;
const EXCERPT_RADIUS: usize = 220;

const SUMMARIZE_LAST: &str = "summarize last";
const SEARCH: &str = "search";
const ABOUT: &str = "what does it say about";

struct Hit {
    version: u64,
    excerpt: String,
}

fn note_text(record: &MemoryRecord) -> String {
    match &record.content {
        serde_json::Value::String(s) => s.clone(),
        other => other
            .get("text")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    }
}

/// Newest first, at most `max` hits.
fn search(notes: &[MemoryRecord], term: &str, max: usize) -> Vec<Hit> {
    notes
        .iter()
        .rev()
        .filter_map(|n| {
            let text = note_text(n);
            let body = strip_file_header(&text);
            contains_ignore_case(body, term).then(|| Hit {
                version: n.version,
                excerpt: excerpt_around(body, term, EXCERPT_RADIUS),
            })
        })
        .take(max)
        .collect()
}

pub struct NotesQuery;

impl NotesQuery {
    fn summarize_last(notes: &[MemoryRecord]) -> SkillResult {
        let last = notes.last().map(note_text).unwrap_or_default();
        SkillResult::say(format!("Summary of the last note: {}", summarize(&last))).with_hud("Summary of the last note")
    }

    fn search_term(term: &str, notes: &[MemoryRecord]) -> SkillResult {
        let hits = search(notes, term, SEARCH_HITS);
        if hits.is_empty() {
            return SkillResult::say(format!("I did not find '{}' in the recent notes.", term))
                .with_hud(format!("Search without results: {}", term));
        }
        let mut speak = format!("Found '{}' in {} note(s).", term, hits.len());
        for (i, hit) in hits.iter().enumerate() {
            speak.push_str(&format!(" Result {}: {}", i + 1, preview(&hit.excerpt, 360)));
        }
        SkillResult::say(speak)
            .with_hud(format!("Search: {} ({} result(s))", term, hits.len()))
            .with_data(serde_json::json!({
                "term": term,
                "versions": hits.iter().map(|h| h.version).collect::<Vec<_>>(),
            }))
    }

    fn about(topic: &str, notes: &[MemoryRecord]) -> SkillResult {
        let hits = search(notes, topic, TOPIC_HITS);
        if hits.is_empty() {
            return SkillResult::say(format!("I found nothing about '{}' in the recent notes.", topic))
                .with_hud(format!("No results: {}", topic));
        }
        let combined = hits.iter().map(|h| h.excerpt.as_str()).collect::<Vec<_>>().join("\n");
        SkillResult::say(format!("About '{}': {}", topic, summarize(&combined))).with_hud(format!("Topic: {}", topic))
    }
}

#[async_trait::async_trait]
impl Skill for NotesQuery {
    fn name(&self) -> &str {
        "notes_query"
    }

    fn description(&self) -> &str {
        "summarize last, search <term>, what does it say about <topic>"
    }

    fn triggers(&self) -> Vec<TriggerPattern> {
        vec![
            TriggerPattern::exact(SUMMARIZE_LAST),
            TriggerPattern::prefix(SEARCH),
            TriggerPattern::prefix(ABOUT),
        ]
    }

    async fn execute(&self, input: &SkillInput<'_>, memory: &MemoryReader<'_>) -> Result<SkillResult, SkillError> {
        let mut notes = memory.history(NOTES_KEY)?;
        if notes.len() > RECENT_NOTES {
            notes = notes.split_off(notes.len() - RECENT_NOTES);
        }
        if notes.is_empty() {
            return Ok(SkillResult::say("I have no notes yet. First use: read file <path>.").with_hud("Notes: empty"));
        }

        let matched = input.matched().text();
        let argument = input.raw_argument();
        let result = match matched.as_str() {
            SUMMARIZE_LAST => Self::summarize_last(&notes),
            SEARCH | ABOUT if argument.is_empty() => {
                return Err(SkillError::InvalidInput(format!("say: {} <term>", matched)));
            }
            SEARCH => Self::search_term(argument, &notes),
            ABOUT => Self::about(argument, &notes),
            other => return Err(SkillError::Execution(format!("unexpected notes trigger '{}'", other))),
        };
        tracing::debug!(target: "evo::skills", trigger = %matched, notes = notes.len(), "notes queried");
        Ok(result)
    }
}

pub struct ClearNotes;

#[async_trait::async_trait]
impl Skill for ClearNotes {
    fn name(&self) -> &str {
        "clear_notes"
    }

    fn description(&self) -> &str {
        "delete all notes"
    }

    fn triggers(&self) -> Vec<TriggerPattern> {
        vec![TriggerPattern::exact("delete all notes"), TriggerPattern::exact("clear notes")]
    }

    fn sensitive(&self) -> bool {
        true
    }

    async fn execute(&self, _input: &SkillInput<'_>, memory: &MemoryReader<'_>) -> Result<SkillResult, SkillError> {
        let count = memory.history(NOTES_KEY)?.len();
        Ok(SkillResult::say(format!("Deleted {} note(s).", count))
            .with_hud("Notes: cleared")
            .with_write(MemoryWrite::Remove {
                key: NOTES_KEY.to_string(),
            })
            .with_data(serde_json::json!({ "removed": count })))
    }
}
