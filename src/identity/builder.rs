//! One-time job: derive the known-identity file from a raw message dump

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use serde::Serializer;
use tracing::info;

use super::IdentityRecord;
use crate::errors::QaError;
use crate::errors::Result;
use crate::normalize::canonical_form;
use crate::normalize::match_key;

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default, alias = "member_name")]
    user_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDump {
    List(Vec<RawMessage>),
    Wrapped { items: Vec<RawMessage> },
}

/// Keyed cache layout in case-insensitive name order
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KnownNames {
    entries: Vec<(String, IdentityRecord)>,
}

impl KnownNames {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, canonical_name: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == canonical_name)
    }

    /// Canonical names in output order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
}

impl Serialize for KnownNames {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(name, record)| (name, record)))
    }
}

/// Collect unique member names from a JSON message dump.
///
/// Names are deduplicated by their case-insensitive key; the first spelling
/// seen wins. Entries are sorted case-insensitively.
pub fn build_known_names(messages_json: &str) -> Result<KnownNames> {
    let dump: RawDump = serde_json::from_str(messages_json)?;
    let messages = match dump {
        RawDump::List(items) | RawDump::Wrapped { items } => items,
    };

    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    for message in messages {
        let Some(name) = message.user_name else {
            continue;
        };
        let canonical = canonical_form(&name);
        if canonical.is_empty() {
            continue;
        }
        seen.entry(match_key(&canonical)).or_insert(canonical);
    }

    let mut entries: Vec<(String, IdentityRecord)> = seen
        .into_values()
        .map(|canonical| (canonical, IdentityRecord::default()))
        .collect();
    entries.sort_by(|(a, _), (b, _)| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
    Ok(KnownNames { entries })
}

/// Read `messages_path`, build the cache layout and write it to `output_path`.
///
/// Returns the number of identities written.
pub fn write_known_names(messages_path: &Path, output_path: &Path) -> Result<usize> {
    if !messages_path.exists() {
        return Err(QaError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("messages file not found at {}", messages_path.display()),
        )));
    }

    let content = std::fs::read_to_string(messages_path)?;
    let names = build_known_names(&content)?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(output_path, serde_json::to_string_pretty(&names)?)?;

    info!(
        "Wrote {} unique names to {}",
        names.len(),
        output_path.display()
    );
    Ok(names.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::KnownIdentityCache;

    #[test]
    fn test_dedupes_case_and_whitespace() {
        let names = build_known_names(
            r#"[
                {"user_name": "Layla Kawaguchi", "message": "hi"},
                {"user_name": "layla  kawaguchi", "message": "again"},
                {"user_name": "Vikram Desai"},
                {"user_name": "   "},
                {"message": "no author"}
            ]"#,
        )
        .unwrap();
        assert_eq!(names.len(), 2);
        assert!(names.contains("Layla Kawaguchi"));
        assert!(names.contains("Vikram Desai"));
    }

    #[test]
    fn test_accepts_wrapped_items() {
        let names =
            build_known_names(r#"{"items": [{"user_name": "Amira Haddad"}]}"#).unwrap();
        assert!(names.contains("Amira Haddad"));
    }

    #[test]
    fn test_names_sort_case_insensitively() {
        let names = build_known_names(
            r#"[{"user_name": "Zed X"}, {"user_name": "amy Y"}, {"user_name": "Bea Z"}]"#,
        )
        .unwrap();
        assert_eq!(names.names().collect::<Vec<_>>(), ["amy Y", "Bea Z", "Zed X"]);

        let json = serde_json::to_string(&names).unwrap();
        assert_eq!(json, r#"{"amy Y":{},"Bea Z":{},"Zed X":{}}"#);
    }

    #[test]
    fn test_written_file_loads_as_cache() {
        let dir = tempfile::tempdir().unwrap();
        let messages = dir.path().join("all_messages.json");
        std::fs::write(
            &messages,
            r#"[{"user_name": "Layla Kawaguchi"}, {"user_name": "Vikram Desai"}]"#,
        )
        .unwrap();
        let output = dir.path().join("config").join("known_names.json");

        let count = write_known_names(&messages, &output).unwrap();
        assert_eq!(count, 2);

        let cache = KnownIdentityCache::load(&output).unwrap();
        assert_eq!(cache.lookup_exact("vikram desai"), Some("Vikram Desai"));
    }

    #[test]
    fn test_missing_messages_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_known_names(&dir.path().join("nope.json"), &dir.path().join("out.json"))
            .unwrap_err();
        assert!(matches!(err, QaError::Io(_)));
    }
}
