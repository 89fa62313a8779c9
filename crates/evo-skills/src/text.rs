//! Small text helpers shared by the note and file skills. All lengths are in chars.

/// Header line prepended to notes that came from a file.
pub(crate) const FILE_HEADER: &str = "[FILE]";

const ELLIPSIS: char = '…';

/// Collapses whitespace and cuts to `max_chars`, marking a cut with an ellipsis.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    let clean = collapse_whitespace(text);
    if clean.is_empty() {
        return "empty.".to_string();
    }
    if clean.chars().count() <= max_chars {
        return clean;
    }
    let mut cut: String = clean.chars().take(max_chars).collect();
    cut.truncate(cut.trim_end().len());
    cut.push(ELLIPSIS);
    cut
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Heuristic summary: the first two sentences, a third one if the first two are short.
/// A leading `[FILE]` header line is skipped.
pub(crate) fn summarize(text: &str) -> String {
    let clean = collapse_whitespace(strip_file_header(text));
    if clean.is_empty() {
        return "empty.".to_string();
    }

    let sentences = split_sentences(&clean);
    let mut out = sentences.iter().take(2).cloned().collect::<Vec<_>>().join(" ");
    if out.chars().count() < 220 && sentences.len() >= 3 {
        out.push(' ');
        out.push_str(&sentences[2]);
    }
    preview(&out, 520)
}

/// Note body without its leading `[FILE] <path>` line, if any.
pub(crate) fn strip_file_header(text: &str) -> &str {
    let body = text.trim_start();
    if !body.starts_with(FILE_HEADER) {
        return text;
    }
    body.split_once('\n').map(|(_, rest)| rest).unwrap_or("")
}

/// Splits after `.`, `!` or `?` when followed by whitespace.
fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|n| n.is_whitespace()) {
            out.push(current.trim().to_string());
            current.clear();
        }
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out
}

/// Case-insensitive char offset of `needle` in `haystack`.
pub(crate) fn find_ignore_case(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    let fold = |c: &char| c.to_lowercase().next().unwrap_or(*c);
    let needle: Vec<char> = needle.iter().map(fold).collect();
    haystack
        .windows(needle.len())
        .position(|w| w.iter().map(fold).eq(needle.iter().copied()))
}

/// Up to `radius` chars either side of the first case-insensitive hit of `term`.
pub(crate) fn excerpt_around(text: &str, term: &str, radius: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let needle: Vec<char> = term.chars().collect();
    let Some(idx) = find_ignore_case(&chars, &needle) else {
        return preview(text, radius);
    };
    let start = idx.saturating_sub(radius);
    let end = (idx + needle.len() + radius).min(chars.len());
    let mut chunk = collapse_whitespace(&chars[start..end].iter().collect::<String>());
    if start > 0 {
        chunk.insert(0, ELLIPSIS);
    }
    if end < chars.len() {
        chunk.push(ELLIPSIS);
    }
    chunk
}

pub(crate) fn contains_ignore_case(text: &str, term: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let needle: Vec<char> = term.chars().collect();
    find_ignore_case(&chars, &needle).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_cuts_on_char_boundaries() {
        assert_eq!(preview("  a   b ", 10), "a b");
        assert_eq!(preview("ação ação ação", 4), "ação…");
        assert_eq!(preview("   ", 4), "empty.");
    }

    #[test]
    fn summary_skips_file_header_and_keeps_two_sentences() {
        let text = "[FILE] C:\\notes.txt\nFirst one. Second one! Third one? Fourth.";
        assert_eq!(summarize(text), "First one. Second one! Third one?");
        assert_eq!(strip_file_header("[FILE] a.txt"), "");
        assert_eq!(strip_file_header("plain"), "plain");
    }

    #[test]
    fn excerpt_marks_both_cuts() {
        let text = "alpha beta GAMMA delta epsilon";
        assert_eq!(excerpt_around(text, "gamma", 3), "…ta GAMMA de…");
        assert!(contains_ignore_case(text, "Delta"));
        assert!(!contains_ignore_case(text, "zeta"));
    }
}
