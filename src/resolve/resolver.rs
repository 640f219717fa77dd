//! Mapping person spans onto canonical member names

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::extractor::is_stop_word;
use super::EntityExtractor;
use super::Resolution;
use crate::config::ResolverConfig;
use crate::identity::KnownIdentityCache;
use crate::normalize::match_key;
use crate::normalize::normalize_question;
use crate::normalize::strip_possessive;

/// Upper bound on clarification candidates produced by fuzzy matching
const MAX_FUZZY_SUGGESTIONS: usize = 5;

/// Longest token window scanned when no span was extracted
const MAX_WINDOW_TOKENS: usize = 3;

/// Resolves the members a question talks about.
///
/// Per span, in order: exact alias match, first-name match, fuzzy match.
/// Questions with no usable span are scanned token by token against a
/// stricter fuzzy threshold.
pub struct NameResolver {
    cache: Arc<KnownIdentityCache>,
    extractor: Arc<dyn EntityExtractor>,
    config: ResolverConfig,
}

impl NameResolver {
    pub fn new(
        cache: Arc<KnownIdentityCache>,
        extractor: Arc<dyn EntityExtractor>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            cache,
            extractor,
            config,
        }
    }

    pub fn cache(&self) -> &KnownIdentityCache {
        &self.cache
    }

    /// Resolve every person mentioned in `question`.
    ///
    /// Any ambiguous mention makes the whole result ambiguous. Distinct
    /// resolved members are returned in order of first mention.
    pub fn resolve(&self, question: &str) -> Resolution {
        let question = normalize_question(question);
        if question.is_empty() || self.cache.is_empty() {
            return Resolution::Unresolved;
        }

        let spans = self.extractor.extract_person_spans(&question);
        debug!(
            "Extractor {} found {} span(s): {:?}",
            self.extractor.name(),
            spans.len(),
            spans.iter().map(|s| s.normalized_text.as_str()).collect::<Vec<_>>()
        );

        let windows = question_windows(&question);
        let spelled_out = self.spelled_out_full_names(&windows);

        let mut resolved: Vec<String> = Vec::new();
        for span in &spans {
            match self.resolve_span_or_tail(&span.normalized_text) {
                Resolution::Resolved(name) => push_unique(&mut resolved, name),
                Resolution::Multiple(names) => {
                    for name in names {
                        push_unique(&mut resolved, name);
                    }
                }
                Resolution::Ambiguous(candidates) => {
                    // "Vikram desai": the span stops at the lowercase surname
                    let mut named = candidates.iter().filter(|name| spelled_out.contains(*name));
                    if let (Some(name), None) = (named.next(), named.next()) {
                        debug!(
                            "Span '{}' settled by the full name {} in the question",
                            span.normalized_text, name
                        );
                        push_unique(&mut resolved, name.clone());
                        continue;
                    }
                    debug!(
                        "Span '{}' is ambiguous between {:?}",
                        span.normalized_text, candidates
                    );
                    return Resolution::Ambiguous(candidates);
                }
                Resolution::Unresolved => {
                    debug!("Span '{}' matched no known member", span.normalized_text);
                }
            }
        }

        match resolved.len() {
            0 => self.resolve_from_tokens(&windows),
            1 => Resolution::Resolved(resolved.remove(0)),
            _ => Resolution::Multiple(resolved),
        }
    }

    /// A capitalized sentence-initial verb ("Compare Sophia") glues onto the
    /// name that follows it; retry without the leading token.
    fn resolve_span_or_tail(&self, span: &str) -> Resolution {
        match self.resolve_span(span) {
            Resolution::Unresolved => match span.split_once(' ') {
                Some((_, tail)) => self.resolve_span_or_tail(tail),
                None => Resolution::Unresolved,
            },
            resolution => resolution,
        }
    }

    /// Resolve a single normalized span
    pub fn resolve_span(&self, span: &str) -> Resolution {
        let key = match_key(span);
        if key.is_empty() {
            return Resolution::Unresolved;
        }

        if let Some(resolution) = from_owner_set(self.cache.lookup_alias(&key).into_iter().collect()) {
            return resolution;
        }

        let Some(first_token) = key.split_whitespace().next() else {
            return Resolution::Unresolved;
        };
        let by_first: Vec<String> = self.cache.lookup_by_first_name(first_token).into_iter().collect();
        match by_first.len() {
            0 => {}
            1 => return Resolution::Resolved(by_first[0].clone()),
            _ => {
                // "Vikram Desay": let the rest of the span pick among the namesakes
                if key.contains(' ') {
                    let narrowed: Vec<(String, f64)> = self
                        .cache
                        .fuzzy_candidates(&key, 1.0 - self.config.fuzzy_threshold)
                        .into_iter()
                        .filter(|(name, _)| by_first.contains(name))
                        .collect();
                    if let Resolution::Resolved(name) = self.decide_fuzzy(narrowed) {
                        return Resolution::Resolved(name);
                    }
                }
                return Resolution::Ambiguous(by_first);
            }
        }

        self.decide_fuzzy(
            self.cache
                .fuzzy_candidates(&key, 1.0 - self.config.fuzzy_threshold),
        )
    }

    /// Members whose multi-token full name appears verbatim, in any case
    fn spelled_out_full_names(&self, windows: &[String]) -> BTreeSet<String> {
        windows
            .iter()
            .filter(|window| window.contains(' '))
            .filter_map(|window| {
                let owners = self.cache.lookup_alias(window);
                if owners.len() == 1 {
                    owners.into_iter().next()
                } else {
                    None
                }
            })
            .collect()
    }

    /// Fallback for questions where extraction found nothing usable
    /// (lowercase names, names the extractor did not recognize).
    fn resolve_from_tokens(&self, windows: &[String]) -> Resolution {
        if windows.is_empty() {
            return Resolution::Unresolved;
        }

        for window in windows {
            if let Some(resolution) =
                from_owner_set(self.cache.lookup_alias(window).into_iter().collect())
            {
                debug!("Token window '{}' matched an alias", window);
                return resolution;
            }
        }

        for window in windows.iter().filter(|w| !w.contains(' ')) {
            if let Some(resolution) =
                from_owner_set(self.cache.lookup_by_first_name(window).into_iter().collect())
            {
                debug!("Token '{}' matched a first name", window);
                return resolution;
            }
        }

        let mut best: BTreeMap<String, f64> = BTreeMap::new();
        for window in windows {
            for (name, score) in self
                .cache
                .fuzzy_candidates(window, 1.0 - self.config.fallback_threshold)
            {
                let entry = best.entry(name).or_insert(0.0);
                if score > *entry {
                    *entry = score;
                }
            }
        }
        let mut candidates: Vec<(String, f64)> = best.into_iter().collect();
        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        self.decide_fuzzy(candidates)
    }

    /// Accept the best fuzzy candidate when it is alone or clearly ahead.
    fn decide_fuzzy(&self, candidates: Vec<(String, f64)>) -> Resolution {
        match candidates.as_slice() {
            [] => Resolution::Unresolved,
            [(name, _)] => Resolution::Resolved(name.clone()),
            [(best, best_score), (_, runner_up), ..]
                if best_score - runner_up >= self.config.fuzzy_margin =>
            {
                Resolution::Resolved(best.clone())
            }
            _ => Resolution::Ambiguous(
                candidates
                    .into_iter()
                    .take(MAX_FUZZY_SUGGESTIONS)
                    .map(|(name, _)| name)
                    .collect(),
            ),
        }
    }
}

fn push_unique(names: &mut Vec<String>, name: String) {
    if !names.contains(&name) {
        names.push(name);
    }
}

fn from_owner_set(owners: Vec<String>) -> Option<Resolution> {
    match owners.len() {
        0 => None,
        1 => owners.into_iter().next().map(Resolution::Resolved),
        _ => Some(Resolution::Ambiguous(owners)),
    }
}

fn question_windows(question: &str) -> Vec<String> {
    let tokens: Vec<String> = match_key(question)
        .split_whitespace()
        .map(|token| strip_possessive(token).to_string())
        .filter(|token| !token.is_empty())
        .collect();
    token_windows(&tokens)
}

/// Token windows, longest first, that neither start nor end on a stop word
fn token_windows(tokens: &[String]) -> Vec<String> {
    let mut windows = Vec::new();
    for size in (1..=MAX_WINDOW_TOKENS.min(tokens.len())).rev() {
        for window in tokens.windows(size) {
            let (Some(first), Some(last)) = (window.first(), window.last()) else {
                continue;
            };
            if is_stop_word(first) || is_stop_word(last) || first.chars().count() < 2 {
                continue;
            }
            windows.push(window.join(" "));
        }
    }
    windows
}
