//! Context assembly from retrieved messages

use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;

use crate::models::RetrievedContextItem;

/// Timestamp layout used in rendered context lines
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Cut `s` to at most `max_chars` characters, ending in "..." when cut.
///
/// Counts characters, not bytes, so multi-byte text never splits.
#[must_use]
pub fn clip_text(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars <= 3 {
        return s.chars().take(max_chars).collect();
    }
    let truncated: String = s.chars().take(max_chars - 3).collect();
    format!("{}...", truncated.trim_end())
}

#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Messages from one member, oldest first
#[derive(Debug, Clone, PartialEq)]
pub struct MemberGroup {
    pub member_name: String,
    pub latest_timestamp: Option<DateTime<Utc>>,
    pub item_count: usize,
    pub items: Vec<RetrievedContextItem>,
}

impl MemberGroup {
    /// Most recent message of the group; the last one when none are dated
    pub fn latest_item(&self) -> Option<&RetrievedContextItem> {
        self.items
            .iter()
            .filter(|item| item.message.timestamp.is_some())
            .max_by_key(|item| item.message.timestamp)
            .or_else(|| self.items.last())
    }
}

/// Retrieved messages grouped per member, ready for prompting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledContext {
    /// Ordered by member name
    pub groups: Vec<MemberGroup>,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|group| group.items.is_empty())
    }

    /// Total number of snippets across groups
    pub fn item_count(&self) -> usize {
        self.groups.iter().map(|group| group.item_count).sum()
    }

    /// Most recent message across all groups
    pub fn latest_item(&self) -> Option<&RetrievedContextItem> {
        let latest_per_group: Vec<&RetrievedContextItem> =
            self.groups.iter().filter_map(MemberGroup::latest_item).collect();
        latest_per_group
            .iter()
            .copied()
            .filter(|item| item.message.timestamp.is_some())
            .max_by_key(|item| item.message.timestamp)
            .or_else(|| latest_per_group.last().copied())
    }

    /// Prompt text: a header per member followed by `[timestamp] Member: text` lines
    pub fn render(&self) -> String {
        let mut sections = Vec::with_capacity(self.groups.len());
        for group in &self.groups {
            let mut section = match group.latest_timestamp {
                Some(ts) => format!(
                    "## {} ({} messages, latest {})\n",
                    group.member_name,
                    group.item_count,
                    format_timestamp(&ts)
                ),
                None => format!("## {} ({} messages)\n", group.member_name, group.item_count),
            };
            for item in &group.items {
                let line = match item.message.timestamp {
                    Some(ts) => format!(
                        "[{}] {}: {}\n",
                        format_timestamp(&ts),
                        item.message.member_name,
                        item.message.text
                    ),
                    None => format!("{}: {}\n", item.message.member_name, item.message.text),
                };
                section.push_str(&line);
            }
            sections.push(section);
        }
        sections.join("\n").trim_end().to_string()
    }
}

/// Assembler grouping retrieved messages per member
pub struct ContextAssembler {
    snippet_max_chars: usize,
}

impl ContextAssembler {
    /// Create a new context assembler
    #[must_use]
    pub const fn new(snippet_max_chars: usize) -> Self {
        Self { snippet_max_chars }
    }

    /// Group by member, order each group chronologically, clip each snippet.
    ///
    /// Undated messages sort after dated ones; ties keep retrieval order.
    #[must_use]
    pub fn assemble(&self, items: &[RetrievedContextItem]) -> AssembledContext {
        let mut by_member: BTreeMap<&str, Vec<&RetrievedContextItem>> = BTreeMap::new();
        for item in items {
            by_member
                .entry(item.message.member_name.as_str())
                .or_default()
                .push(item);
        }

        let groups = by_member
            .into_iter()
            .map(|(member_name, mut group)| {
                group.sort_by_key(|item| {
                    (item.message.timestamp.is_none(), item.message.timestamp)
                });
                let latest_timestamp = group.iter().filter_map(|i| i.message.timestamp).max();
                let items: Vec<RetrievedContextItem> = group
                    .into_iter()
                    .map(|item| {
                        let mut clipped = item.clone();
                        clipped.message.text =
                            clip_text(&item.message.text, self.snippet_max_chars);
                        clipped
                    })
                    .collect();
                MemberGroup {
                    member_name: member_name.to_string(),
                    latest_timestamp,
                    item_count: items.len(),
                    items,
                }
            })
            .collect();

        AssembledContext { groups }
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(500)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::Message;

    fn item(id: &str, member: &str, hour: Option<u32>, text: &str) -> RetrievedContextItem {
        RetrievedContextItem {
            message: Message {
                id: id.to_string(),
                member_name: member.to_string(),
                timestamp: hour.map(|h| Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap()),
                text: text.to_string(),
                embedding: Vec::new(),
            },
            similarity_score: 0.5,
        }
    }

    fn ids(group: &MemberGroup) -> Vec<&str> {
        group.items.iter().map(|i| i.message.id.as_str()).collect()
    }

    #[test]
    fn test_groups_sorted_by_member_then_time() {
        let items = vec![
            item("v2", "Vikram Desai", Some(12), "second"),
            item("l1", "Layla Kawaguchi", Some(9), "a"),
            item("v1", "Vikram Desai", Some(8), "first"),
        ];
        let context = ContextAssembler::default().assemble(&items);
        assert_eq!(context.groups.len(), 2);
        assert_eq!(context.groups[0].member_name, "Layla Kawaguchi");
        assert_eq!(ids(&context.groups[1]), vec!["v1", "v2"]);
        assert_eq!(
            context.groups[1].latest_timestamp,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(context.item_count(), 3);
    }

    #[test]
    fn test_ties_and_undated_keep_retrieval_order() {
        let items = vec![
            item("x", "A", None, "undated first"),
            item("b", "A", Some(10), "tie one"),
            item("c", "A", Some(10), "tie two"),
            item("y", "A", None, "undated second"),
            item("a", "A", Some(7), "earliest"),
        ];
        let context = ContextAssembler::default().assemble(&items);
        assert_eq!(ids(&context.groups[0]), vec!["a", "b", "c", "x", "y"]);
    }

    #[test]
    fn test_snippets_clipped_after_sorting() {
        let long = "x".repeat(40);
        let context = ContextAssembler::new(10).assemble(&[item("1", "A", Some(1), &long)]);
        let text = &context.groups[0].items[0].message.text;
        assert_eq!(text.chars().count(), 10);
        assert!(text.ends_with("..."));
    }

    #[test]
    fn test_empty() {
        let context = ContextAssembler::default().assemble(&[]);
        assert!(context.is_empty());
        assert_eq!(context.render(), "");
        assert!(context.latest_item().is_none());
    }

    #[test]
    fn test_render_lines() {
        let context = ContextAssembler::default().assemble(&[
            item("1", "Layla Kawaguchi", Some(9), "Flying to London on Friday"),
            item("2", "Layla Kawaguchi", None, "Need a hotel"),
        ]);
        let rendered = context.render();
        assert!(rendered.starts_with("## Layla Kawaguchi (2 messages, latest 2024-05-01 09:00:00)"));
        assert!(rendered.contains("[2024-05-01 09:00:00] Layla Kawaguchi: Flying to London on Friday"));
        assert!(rendered.ends_with("Layla Kawaguchi: Need a hotel"));
    }

    #[test]
    fn test_latest_item_across_groups() {
        let context = ContextAssembler::default().assemble(&[
            item("1", "A", Some(9), "a"),
            item("2", "B", Some(11), "b"),
            item("3", "B", None, "c"),
        ]);
        assert_eq!(context.latest_item().unwrap().message.id, "2");
    }

    #[test]
    fn test_clip_text() {
        assert_eq!(clip_text("short", 10), "short");
        assert_eq!(clip_text("héllo wörld", 8), "héllo...");
        assert_eq!(clip_text("abcdef", 2), "ab");
        let preview = clip_text(&"y".repeat(200), 160);
        assert_eq!(preview.chars().count(), 160);
    }
}
