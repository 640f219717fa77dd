//! Known-identity cache
//!
//! A read-only map from canonical member names to the alias forms a question
//! may use for them, plus a reverse index from first names to canonical names
//! used to detect ambiguity. Built once by [`builder`], loaded whole at
//! startup, never mutated while serving.
//!
//! Two file layouts are accepted:
//!
//! ```json
//! { "Layla Kawaguchi": { "first_name": "Layla", "last_name": "Kawaguchi", "aliases": ["Lay"] } }
//! ```
//!
//! ```json
//! [ { "normalized": "layla kawaguchi", "raw": "Layla Kawaguchi" } ]
//! ```

pub mod builder;

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::errors::QaError;
use crate::errors::Result;
use crate::normalize::canonical_form;
use crate::normalize::match_key;

/// One member as the cache knows them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownIdentity {
    pub canonical_name: String,
    pub first_name: String,
    pub last_name: Option<String>,
    /// Extra surface forms (nicknames, alternate spellings)
    pub aliases: BTreeSet<String>,
}

impl KnownIdentity {
    /// Build an identity, deriving first/last name from the canonical name when absent
    pub fn new(
        canonical_name: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
        aliases: impl IntoIterator<Item = String>,
    ) -> Option<Self> {
        let canonical_name = canonical_form(canonical_name);
        let mut tokens = canonical_name.split_whitespace();
        let derived_first = tokens.next()?.to_string();
        let derived_last = tokens.collect::<Vec<_>>().join(" ");

        let first_name = first_name
            .map(canonical_form)
            .filter(|s| !s.is_empty())
            .unwrap_or(derived_first);
        let last_name = last_name
            .map(canonical_form)
            .filter(|s| !s.is_empty())
            .or_else(|| (!derived_last.is_empty()).then_some(derived_last));

        let aliases = aliases
            .into_iter()
            .map(|alias| canonical_form(&alias))
            .filter(|alias| !alias.is_empty())
            .collect();

        Some(Self {
            canonical_name,
            first_name,
            last_name,
            aliases,
        })
    }

    /// Forms that identify the member on their own: canonical name, `first last`, aliases
    pub fn full_forms(&self) -> BTreeSet<String> {
        let mut forms = BTreeSet::new();
        forms.insert(match_key(&self.canonical_name));
        if let Some(last) = &self.last_name {
            forms.insert(match_key(&format!("{} {}", self.first_name, last)));
        }
        for alias in &self.aliases {
            forms.insert(match_key(alias));
        }
        forms.retain(|form| !form.is_empty());
        forms
    }

    /// Every form fuzzy matching compares against, including bare first and last names
    fn fuzzy_forms(&self) -> BTreeSet<String> {
        let mut forms = self.full_forms();
        forms.insert(match_key(&self.first_name));
        if let Some(last) = &self.last_name {
            forms.insert(match_key(last));
        }
        forms.retain(|form| !form.is_empty());
        forms
    }
}

/// One entry of the keyed cache file
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyEntry {
    raw: String,
    #[serde(default)]
    normalized: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CacheFile {
    Keyed(BTreeMap<String, IdentityRecord>),
    Legacy(Vec<LegacyEntry>),
}

/// Read-only known-identity cache
#[derive(Debug, Default, Clone)]
pub struct KnownIdentityCache {
    identities: BTreeMap<String, KnownIdentity>,
    /// match key of a full form -> canonical names using it
    alias_index: HashMap<String, BTreeSet<String>>,
    /// match key of a first name -> canonical names
    first_name_index: HashMap<String, BTreeSet<String>>,
    /// (match key, canonical name) pairs scanned by fuzzy matching
    fuzzy_forms: Vec<(String, String)>,
}

impl KnownIdentityCache {
    /// Load the cache file. Missing or malformed files are fatal.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            QaError::CacheLoad(format!(
                "cannot read {} ({e}); run `memberqa build-known-names` to generate it",
                path.display()
            ))
        })?;
        let cache = Self::from_json_str(&content)
            .map_err(|e| QaError::CacheLoad(format!("{}: {e}", path.display())))?;

        if cache.is_empty() {
            warn!("Known-identity cache at {} is empty", path.display());
        }
        info!(
            "Loaded {} known identities from {}",
            cache.len(),
            path.display()
        );
        Ok(cache)
    }

    /// Parse either supported file layout
    pub fn from_json_str(content: &str) -> Result<Self> {
        let file: CacheFile = serde_json::from_str(content)
            .map_err(|e| QaError::CacheLoad(format!("malformed known-identity file: {e}")))?;

        let identities = match file {
            CacheFile::Keyed(records) => records
                .into_iter()
                .filter_map(|(name, record)| {
                    KnownIdentity::new(
                        &name,
                        record.first_name.as_deref(),
                        record.last_name.as_deref(),
                        record.aliases,
                    )
                })
                .collect::<Vec<_>>(),
            CacheFile::Legacy(entries) => entries
                .into_iter()
                .filter_map(|entry| {
                    KnownIdentity::new(&entry.raw, None, None, entry.normalized)
                })
                .collect(),
        };

        Ok(Self::from_identities(identities))
    }

    /// Build the cache and its indexes from identities
    pub fn from_identities(identities: impl IntoIterator<Item = KnownIdentity>) -> Self {
        let mut cache = Self::default();

        for identity in identities {
            if cache.identities.contains_key(&identity.canonical_name) {
                debug!("Duplicate identity {} ignored", identity.canonical_name);
                continue;
            }

            for form in identity.full_forms() {
                cache
                    .alias_index
                    .entry(form)
                    .or_default()
                    .insert(identity.canonical_name.clone());
            }

            let first_key = match_key(&identity.first_name);
            if !first_key.is_empty() {
                cache
                    .first_name_index
                    .entry(first_key)
                    .or_default()
                    .insert(identity.canonical_name.clone());
            }

            for form in identity.fuzzy_forms() {
                cache
                    .fuzzy_forms
                    .push((form, identity.canonical_name.clone()));
            }

            cache
                .identities
                .insert(identity.canonical_name.clone(), identity);
        }

        for (form, owners) in &cache.alias_index {
            if owners.len() > 1 {
                warn!("Alias form '{}' is shared by {:?}", form, owners);
            }
        }

        cache
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// True if `canonical_name` is a member of the cache
    pub fn contains(&self, canonical_name: &str) -> bool {
        self.identities.contains_key(canonical_name)
    }

    pub fn get(&self, canonical_name: &str) -> Option<&KnownIdentity> {
        self.identities.get(canonical_name)
    }

    pub fn identities(&self) -> impl Iterator<Item = &KnownIdentity> {
        self.identities.values()
    }

    /// Canonical names owning a full alias form, case-insensitively
    pub fn lookup_alias(&self, name: &str) -> BTreeSet<String> {
        self.alias_index
            .get(&match_key(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Exact case-insensitive match against full alias forms.
    ///
    /// Returns `None` when nothing matches or the form is shared by several members.
    pub fn lookup_exact(&self, name: &str) -> Option<&str> {
        let owners = self.alias_index.get(&match_key(name))?;
        if owners.len() != 1 {
            return None;
        }
        owners
            .iter()
            .next()
            .and_then(|canonical| self.identities.get(canonical))
            .map(|identity| identity.canonical_name.as_str())
    }

    /// Canonical names whose first name matches, case-insensitively
    pub fn lookup_by_first_name(&self, first_name: &str) -> BTreeSet<String> {
        self.first_name_index
            .get(&match_key(first_name))
            .cloned()
            .unwrap_or_default()
    }

    /// Fuzzy candidates whose best form lies within `max_distance` of `text`.
    ///
    /// Similarity is Jaro-Winkler over the lowercase match keys; distance is
    /// `1 - similarity`. Ordered by descending score, then canonical name.
    pub fn fuzzy_candidates(&self, text: &str, max_distance: f64) -> Vec<(String, f64)> {
        let key = match_key(text);
        if key.is_empty() {
            return Vec::new();
        }

        let mut best: BTreeMap<&str, f64> = BTreeMap::new();
        for (form, canonical) in &self.fuzzy_forms {
            let score = strsim::jaro_winkler(&key, form);
            let entry = best.entry(canonical.as_str()).or_insert(0.0);
            if score > *entry {
                *entry = score;
            }
        }

        let mut candidates: Vec<(String, f64)> = best
            .into_iter()
            .filter(|(_, score)| 1.0 - score <= max_distance)
            .map(|(canonical, score)| (canonical.to_string(), score))
            .collect();

        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        candidates
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn sample_cache() -> KnownIdentityCache {
        KnownIdentityCache::from_json_str(
            r#"{
                "Layla Kawaguchi": {"aliases": ["Lay"]},
                "Vikram Desai": {},
                "Vikram Singh": {},
                "Amina Van Den Berg": {"first_name": "Amina", "last_name": "Van Den Berg"},
                "Sophia Al-Farsi": {}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_derives_first_and_last_name() {
        let cache = sample_cache();
        let layla = cache.get("Layla Kawaguchi").unwrap();
        assert_eq!(layla.first_name, "Layla");
        assert_eq!(layla.last_name.as_deref(), Some("Kawaguchi"));
        let amina = cache.get("Amina Van Den Berg").unwrap();
        assert_eq!(amina.last_name.as_deref(), Some("Van Den Berg"));
    }

    #[test]
    fn test_lookup_exact_is_case_insensitive() {
        let cache = sample_cache();
        assert_eq!(cache.lookup_exact("layla KAWAGUCHI"), Some("Layla Kawaguchi"));
        assert_eq!(cache.lookup_exact("Lay"), Some("Layla Kawaguchi"));
        assert_eq!(cache.lookup_exact("Layla Kawaguchi's"), Some("Layla Kawaguchi"));
        assert_eq!(cache.lookup_exact("Layla"), None);
    }

    #[test]
    fn test_lookup_by_first_name() {
        let cache = sample_cache();
        let vikrams = cache.lookup_by_first_name("vikram");
        assert_eq!(
            vikrams.into_iter().collect::<Vec<_>>(),
            vec!["Vikram Desai".to_string(), "Vikram Singh".to_string()]
        );
        assert_eq!(cache.lookup_by_first_name("Layla").len(), 1);
        assert!(cache.lookup_by_first_name("Nobody").is_empty());
    }

    #[test]
    fn test_fuzzy_candidates_ordering() {
        let cache = sample_cache();
        let candidates = cache.fuzzy_candidates("Vikrm", 0.2);
        assert!(candidates.len() >= 2);
        assert_eq!(candidates[0].0, "Vikram Desai");
        assert_eq!(candidates[1].0, "Vikram Singh");
        assert!((candidates[0].1 - candidates[1].1).abs() < 1e-9);

        let typo = cache.fuzzy_candidates("Kawaguchy", 0.15);
        assert_eq!(typo[0].0, "Layla Kawaguchi");
    }

    #[test]
    fn test_fuzzy_candidates_respects_distance() {
        let cache = sample_cache();
        assert!(cache.fuzzy_candidates("zzzzzz", 0.1).is_empty());
        assert!(cache.fuzzy_candidates("", 1.0).is_empty());
    }

    #[test]
    fn test_legacy_layout() {
        let cache = KnownIdentityCache::from_json_str(
            r#"[{"normalized": "layla kawaguchi", "raw": "Layla Kawaguchi"},
                {"raw": "  Hans   Müller "}]"#,
        )
        .unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.contains("Hans Müller"));
        assert_eq!(cache.lookup_exact("hans müller"), Some("Hans Müller"));
    }

    #[test]
    fn test_shared_alias_is_not_exact() {
        let cache = KnownIdentityCache::from_json_str(
            r#"{"Vikram Desai": {"aliases": ["Vik"]}, "Vikram Singh": {"aliases": ["Vik"]}}"#,
        )
        .unwrap();
        assert_eq!(cache.lookup_exact("Vik"), None);
        assert_eq!(cache.lookup_alias("vik").len(), 2);
    }

    #[test]
    fn test_load_missing_file_is_cache_error() {
        let err = KnownIdentityCache::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, QaError::CacheLoad(_)));
    }

    #[test]
    fn test_load_malformed_file_is_cache_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"Layla\": 42").unwrap();
        let err = KnownIdentityCache::load(file.path()).unwrap_err();
        assert!(matches!(err, QaError::CacheLoad(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"Layla Kawaguchi": {{}}}}"#).unwrap();
        let cache = KnownIdentityCache::load(file.path()).unwrap();
        assert!(cache.contains("Layla Kawaguchi"));
    }
}
