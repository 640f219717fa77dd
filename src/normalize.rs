//! Text normalization shared by the identity cache, extractor and retriever
//!
//! The same `canonical_form` is applied when the known-identity file is built,
//! when it is loaded, and when a retrieval filter is constructed, so the
//! member filter always carries the exact form the index was written with.

use unicode_normalization::UnicodeNormalization;

/// Typographic characters folded to their ASCII counterparts
const QUOTE_FOLDS: &[(char, char)] = &[
    ('\u{2019}', '\''),
    ('\u{2018}', '\''),
    ('\u{2032}', '\''),
    ('\u{02bc}', '\''),
    ('\u{201c}', '"'),
    ('\u{201d}', '"'),
    ('\u{fffd}', '\''),
];

/// NFKC-fold a question and replace smart quotes, then trim it.
pub fn normalize_question(question: &str) -> String {
    let folded: String = question
        .nfkc()
        .map(|c| {
            QUOTE_FOLDS
                .iter()
                .find(|(from, _)| *from == c)
                .map_or(c, |(_, to)| *to)
        })
        .collect();
    folded.trim().to_string()
}

/// Drop leading punctuation and quote marks that confuse span detection.
///
/// Returns the input unchanged if nothing would be left.
pub fn strip_question_prefix(question: &str) -> &str {
    let stripped = question.trim_start_matches(|c: char| {
        c.is_whitespace() || matches!(c, '?' | '!' | '.' | ',' | ':' | ';' | '-' | '\u{2014}' | '\u{2013}' | '"' | '\'' | '`')
    });
    if stripped.is_empty() {
        question
    } else {
        stripped
    }
}

/// Remove a trailing possessive (`'s` or `’s`).
pub fn strip_possessive(value: &str) -> &str {
    let trimmed = value.trim();
    for suffix in ["'s", "'S", "\u{2019}s", "\u{2019}S"] {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            return stripped.trim_end();
        }
    }
    trimmed
}

/// Collapse every whitespace run into a single space and trim.
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Display form of a member name: trimmed, possessive removed, single-spaced.
pub fn canonical_form(name: &str) -> String {
    collapse_whitespace(strip_possessive(&collapse_whitespace(name)))
}

/// Case-insensitive lookup key for a name or alias.
///
/// Lowercases the canonical form and turns punctuation other than inner
/// apostrophes and hyphens into spaces (`"O'Neil-Smith"` stays intact,
/// `"Layla,"` becomes `"layla"`).
pub fn match_key(name: &str) -> String {
    let canonical = canonical_form(name).to_lowercase();
    let spaced: String = canonical
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '\'' || c == '-' {
                c
            } else {
                ' '
            }
        })
        .collect();
    spaced
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| c == '\'' || c == '-'))
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a detected person span.
///
/// Collapses whitespace, trims surrounding punctuation and strips a possessive.
pub fn normalize_span(span: &str) -> String {
    let collapsed = collapse_whitespace(span);
    let inner = collapsed.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'' && c != '\u{2019}');
    let without_possessive = strip_possessive(inner);
    collapse_whitespace(without_possessive.trim_matches(|c: char| !c.is_alphanumeric()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_question_folds_quotes() {
        assert_eq!(
            normalize_question("  What is Layla\u{2019}s plan? "),
            "What is Layla's plan?"
        );
        assert_eq!(normalize_question("\u{201c}hi\u{201d}"), "\"hi\"");
    }

    #[test]
    fn test_strip_question_prefix() {
        assert_eq!(strip_question_prefix("-- \"When is it?"), "When is it?");
        assert_eq!(strip_question_prefix("???"), "???");
        assert_eq!(strip_question_prefix("Plain"), "Plain");
    }

    #[test]
    fn test_strip_possessive() {
        assert_eq!(strip_possessive("Layla's"), "Layla");
        assert_eq!(strip_possessive("Layla\u{2019}s"), "Layla");
        assert_eq!(strip_possessive("James"), "James");
        assert_eq!(strip_possessive(" Vikram Desai's "), "Vikram Desai");
    }

    #[test]
    fn test_canonical_form() {
        assert_eq!(canonical_form("  Layla   Kawaguchi "), "Layla Kawaguchi");
        assert_eq!(canonical_form("Layla Kawaguchi's"), "Layla Kawaguchi");
    }

    #[test]
    fn test_match_key() {
        assert_eq!(match_key("Layla  KAWAGUCHI"), "layla kawaguchi");
        assert_eq!(match_key("O'Neil-Smith,"), "o'neil-smith");
        assert_eq!(match_key("Layla's"), "layla");
    }

    #[test]
    fn test_normalize_span() {
        assert_eq!(normalize_span("Layla's"), "Layla");
        assert_eq!(normalize_span("\"Vikram   Desai\","), "Vikram Desai");
        assert_eq!(normalize_span("Amira\u{2019}s?"), "Amira");
        assert_eq!(normalize_span("..."), "");
    }
}
