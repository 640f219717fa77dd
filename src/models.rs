use chrono::DateTime;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// A member message as produced by ingestion. Read-only to the QA core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// Canonical member name, exactly as indexed
    pub member_name: String,
    /// `None` when the source record carried no parseable timestamp
    pub timestamp: Option<DateTime<Utc>>,
    pub text: String,
    /// Empty for messages reconstructed from index metadata
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

/// A person-name span found in a question, before resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntity {
    /// Text as it appeared in the question
    pub surface_text: String,
    /// Possessive stripped, punctuation trimmed, whitespace collapsed
    pub normalized_text: String,
}

/// A message returned by the retriever together with its similarity
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedContextItem {
    pub message: Message,
    pub similarity_score: f32,
}

/// Parse a timestamp the way message dumps and index metadata carry them.
///
/// Accepts RFC 3339, a handful of naive layouts (taken as UTC) and unix
/// seconds given as a string.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let candidate = raw.trim();
    if candidate.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(candidate) {
        return Some(parsed.with_timezone(&Utc));
    }

    for layout in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(candidate, layout) {
            return Some(naive.and_utc());
        }
    }

    for layout in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(candidate, layout) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }

    candidate
        .parse::<f64>()
        .ok()
        .and_then(timestamp_from_unix_seconds)
}

/// Convert unix seconds (possibly fractional) into a UTC timestamp
pub fn timestamp_from_unix_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.trunc() as i64;
    let nanos = ((seconds - seconds.trunc()) * 1e9).round() as u32;
    DateTime::from_timestamp(whole, nanos.min(999_999_999))
}

#[cfg(test)]
mod tests {
    use chrono::Datelike;
    use chrono::Timelike;

    use super::*;

    #[test]
    fn test_parse_rfc3339_normalizes_to_utc() {
        let ts = parse_timestamp("2024-05-03T10:15:00+02:00").unwrap();
        assert_eq!(ts.hour(), 8);
        assert_eq!(ts.day(), 3);
    }

    #[test]
    fn test_parse_naive_layouts() {
        assert!(parse_timestamp("2024-05-03 10:15:00").is_some());
        assert!(parse_timestamp("2024-05-03T10:15:00.123456").is_some());
        assert!(parse_timestamp("05/03/2024 10:15").is_some());
        let date_only = parse_timestamp("2024-05-03").unwrap();
        assert_eq!(date_only.hour(), 0);
        assert_eq!(parse_timestamp("05/03/2024").unwrap().month(), 5);
    }

    #[test]
    fn test_parse_unix_seconds() {
        let ts = parse_timestamp("1700000000").unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("   ").is_none());
        assert!(parse_timestamp("next tuesday").is_none());
        assert!(timestamp_from_unix_seconds(f64::NAN).is_none());
    }
}
