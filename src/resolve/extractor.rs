//! Person-span extraction

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::ExtractedEntity;
use crate::normalize::normalize_question;
use crate::normalize::normalize_span;
use crate::normalize::strip_possessive;
use crate::normalize::strip_question_prefix;

/// Capability interface over a named-entity recognizer.
///
/// Implementations return person spans already normalized (possessive
/// stripped, punctuation trimmed, whitespace collapsed). An empty result is a
/// normal outcome. Implementations must be deterministic for a given input.
pub trait EntityExtractor: Send + Sync {
    /// Identifier used in logs
    fn name(&self) -> &str;

    fn extract_person_spans(&self, question: &str) -> Vec<ExtractedEntity>;
}

/// Words that are capitalized in questions without being names
pub(crate) const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "am", "an", "and", "any", "are", "at", "be", "before", "but",
    "by", "can", "could", "did", "do", "does", "for", "from", "give", "had", "has", "have", "he",
    "her", "his", "how", "i", "if", "in", "is", "it", "its", "list", "may", "me", "might", "my",
    "of", "on", "or", "our", "please", "she", "should", "show", "so", "summarize", "tell", "that",
    "the", "their", "them", "then", "there", "they", "this", "to", "was", "we", "were", "what",
    "when", "where", "which", "who", "whom", "whose", "why", "will", "with", "would", "you",
    "your", "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
    "january", "february", "march", "april", "june", "july", "august", "september", "october",
    "november", "december", "today", "tomorrow", "yesterday",
];

fn stop_words() -> &'static HashSet<&'static str> {
    static WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    WORDS.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

pub(crate) fn is_stop_word(token: &str) -> bool {
    stop_words().contains(token.to_lowercase().as_str())
}

fn word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[\p{L}\p{M}][\p{L}\p{M}\p{Nd}'\u{2019}\-]*").expect("word pattern is valid")
    })
}

/// Proper-noun chunker: runs of capitalized words that are not stop words.
///
/// A run breaks on anything but whitespace between words, and after a
/// possessive (`"Layla's trip"` yields `Layla`).
#[derive(Debug, Default, Clone)]
pub struct CapitalizedSpanExtractor;

impl CapitalizedSpanExtractor {
    pub fn new() -> Self {
        Self
    }

    fn is_name_token(token: &str) -> bool {
        let bare = strip_possessive(token);
        let starts_upper = bare.chars().next().is_some_and(char::is_uppercase);
        starts_upper && !is_stop_word(bare)
    }

    fn is_possessive(token: &str) -> bool {
        strip_possessive(token).len() != token.len()
    }
}

impl EntityExtractor for CapitalizedSpanExtractor {
    fn name(&self) -> &str {
        "capitalized-span"
    }

    fn extract_person_spans(&self, question: &str) -> Vec<ExtractedEntity> {
        let normalized = normalize_question(question);
        let text = strip_question_prefix(&normalized);

        let mut spans: Vec<(usize, usize)> = Vec::new();
        let mut current: Option<(usize, usize)> = None;

        for word in word_pattern().find_iter(text) {
            let token = word.as_str();
            let contiguous = current
                .map(|(_, end)| text[end..word.start()].chars().all(char::is_whitespace))
                .unwrap_or(false);

            if !Self::is_name_token(token) {
                spans.extend(current.take());
                continue;
            }

            current = match current {
                Some((start, _)) if contiguous => Some((start, word.end())),
                other => {
                    spans.extend(other);
                    Some((word.start(), word.end()))
                }
            };

            if Self::is_possessive(token) {
                spans.extend(current.take());
            }
        }
        spans.extend(current);

        let mut seen = HashSet::new();
        spans
            .into_iter()
            .filter_map(|(start, end)| {
                let surface_text = text[start..end].to_string();
                let normalized_text = normalize_span(&surface_text);
                if normalized_text.is_empty() || !seen.insert(normalized_text.to_lowercase()) {
                    return None;
                }
                Some(ExtractedEntity {
                    surface_text,
                    normalized_text,
                })
            })
            .collect()
    }
}
