//! Input normalization: one raw UTF-8 string in, one [`NormalizedInput`] out.
//!
//! Normalization is lower-casing, Latin diacritic folding (speech engines emit
//! `não`, typed input often says `nao`), whitespace collapsing, and trimming of
//! sentence punctuation from token edges. The same function is applied to
//! trigger patterns at registration so both sides compare in one space.

use serde::Serialize;

/// Punctuation stripped from the edges of each token (not from the middle:
/// `notes.txt` and `c:\temp` survive intact).
const EDGE_PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', ':', '"', '\'', '¿', '¡', '…'];

/// Errors produced while normalizing raw input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    /// The input contained no tokens after normalization.
    #[error("input is empty after normalization")]
    Empty,
}

/// Normalized view of a single raw input. Owned by one decision cycle and never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedInput {
    raw: String,
    text: String,
    tokens: Vec<String>,
    /// Byte offset in `raw` of the word each token came from.
    #[serde(skip)]
    starts: Vec<usize>,
}

impl NormalizedInput {
    /// Normalizes `raw`. Fails with [`InputError::Empty`] when no tokens remain.
    pub fn parse(raw: &str) -> Result<Self, InputError> {
        let (tokens, starts): (Vec<String>, Vec<usize>) = raw_words(raw)
            .into_iter()
            .filter_map(|(start, word)| normalize_word(word).map(|token| (token, start)))
            .unzip();
        if tokens.is_empty() {
            return Err(InputError::Empty);
        }
        Ok(Self {
            raw: raw.to_string(),
            text: tokens.join(" "),
            tokens,
            starts,
        })
    }

    /// The original text, untouched (kept for audit and for skills that need exact paths).
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Normalized text: tokens joined by single spaces.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// True when the normalized token sequence starts with `prefix` (token boundaries).
    pub fn starts_with_tokens(&self, prefix: &[String]) -> bool {
        !prefix.is_empty() && self.tokens.len() >= prefix.len() && self.tokens[..prefix.len()] == *prefix
    }

    /// Normalized text after dropping the first `n` tokens (empty string when nothing is left).
    pub fn rest_after(&self, n: usize) -> String {
        self.tokens.iter().skip(n).cloned().collect::<Vec<_>>().join(" ")
    }

    /// Raw text (case and punctuation preserved) from the word of token `n` onwards, trimmed.
    ///
    /// Raw words that normalize to nothing (`...`, `?!`) have no token, so they never
    /// shift the alignment.
    pub fn raw_after_tokens(&self, n: usize) -> &str {
        match self.starts.get(n) {
            Some(&start) => self.raw[start..].trim(),
            None => "",
        }
    }
}

/// Splits text into normalized tokens. Shared by input parsing and pattern construction.
pub fn tokenize(text: &str) -> Vec<String> {
    raw_words(text).into_iter().filter_map(|(_, word)| normalize_word(word)).collect()
}

/// Whitespace-separated words of `text` with their byte offsets.
fn raw_words(text: &str) -> Vec<(usize, &str)> {
    let mut words = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                words.push((s, &text[s..i]));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        words.push((s, &text[s..]));
    }
    words
}

fn normalize_word(word: &str) -> Option<String> {
    let folded: String = word.to_lowercase().chars().map(fold_char).collect();
    let token = folded.trim_matches(EDGE_PUNCTUATION);
    (!token.is_empty()).then(|| token.to_string())
}

/// Normalizes a phrase to its canonical single-spaced form.
pub fn normalize_phrase(text: &str) -> String {
    tokenize(text).join(" ")
}

fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'ã' | 'â' | 'ä' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'õ' | 'ô' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        'ý' | 'ÿ' => 'y',
        _ => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_lowercases() {
        let n = NormalizedInput::parse("  Open   FILE\tnow ").unwrap();
        assert_eq!(n.text(), "open file now");
        assert_eq!(n.tokens(), ["open", "file", "now"]);
        assert_eq!(n.raw(), "  Open   FILE\tnow ");
    }

    #[test]
    fn folds_diacritics() {
        assert_eq!(normalize_phrase("Não, Confirmação"), "nao confirmacao");
    }

    #[test]
    fn trims_edge_punctuation_only() {
        let n = NormalizedInput::parse("Help?").unwrap();
        assert_eq!(n.text(), "help");
        let n = NormalizedInput::parse("open notes.txt.").unwrap();
        assert_eq!(n.tokens(), ["open", "notes.txt"]);
    }

    #[test]
    fn empty_and_punctuation_only_inputs_fail() {
        assert_eq!(NormalizedInput::parse("   "), Err(InputError::Empty));
        assert_eq!(NormalizedInput::parse("?! ..."), Err(InputError::Empty));
    }

    #[test]
    fn token_prefix_respects_boundaries() {
        let n = NormalizedInput::parse("opening file").unwrap();
        assert!(!n.starts_with_tokens(&tokenize("open")));
        let n = NormalizedInput::parse("open file").unwrap();
        assert!(n.starts_with_tokens(&tokenize("open")));
        assert_eq!(n.rest_after(1), "file");
        assert_eq!(n.rest_after(5), "");
    }

    #[test]
    fn raw_tail_keeps_case() {
        let n = NormalizedInput::parse("Read File  C:\\Temp\\Notes.TXT ").unwrap();
        assert_eq!(n.raw_after_tokens(2), "C:\\Temp\\Notes.TXT");
        assert_eq!(n.raw_after_tokens(4), "");
    }

    #[test]
    fn raw_tail_skips_punctuation_only_words() {
        let n = NormalizedInput::parse("... Remember  Car as RED").unwrap();
        assert_eq!(n.tokens(), ["remember", "car", "as", "red"]);
        assert_eq!(n.raw_after_tokens(1), "Car as RED");

        let n = NormalizedInput::parse("read ?! file \"My Notes.txt\"").unwrap();
        assert_eq!(n.raw_after_tokens(2), "\"My Notes.txt\"");
    }
}
