//! Member name resolution
//!
//! - [`extractor`] finds person-name spans in a question
//! - [`resolver`] maps spans onto canonical identities from the
//!   [`KnownIdentityCache`](crate::identity::KnownIdentityCache)

pub mod extractor;
pub mod resolver;

pub use extractor::CapitalizedSpanExtractor;
pub use extractor::EntityExtractor;
pub use resolver::NameResolver;

use serde::Serialize;

/// Outcome of resolving the people a question refers to.
///
/// None of these are errors: `Ambiguous` turns into a clarification request,
/// `Unresolved` into an unfiltered search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "members", rename_all = "snake_case")]
pub enum Resolution {
    /// Exactly one member
    Resolved(String),
    /// Several members fit one mention; ordered for presentation
    Ambiguous(Vec<String>),
    /// Several distinct mentions, each resolved; in order of first mention
    Multiple(Vec<String>),
    /// Nobody known is mentioned
    Unresolved,
}

impl Resolution {
    /// Canonical names carried by this outcome
    #[must_use]
    pub fn members(&self) -> Vec<&str> {
        match self {
            Self::Resolved(name) => vec![name.as_str()],
            Self::Ambiguous(names) | Self::Multiple(names) => {
                names.iter().map(String::as_str).collect()
            }
            Self::Unresolved => Vec::new(),
        }
    }

    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous(_))
    }
}
