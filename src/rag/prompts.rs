//! Prompt templates for member questions

use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

use super::context::clip_text;
use super::context::format_timestamp;
use super::context::AssembledContext;
use crate::config::PromptsConfig;

/// Length of the latest-activity preview in the user prompt
const LATEST_PREVIEW_CHARS: usize = 160;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions about \
community members using their own messages. Use only the provided messages to answer the \
question. If the messages do not contain the answer, say so.";

const DEFAULT_USER_TEMPLATE: &str = "Message summary:
- Member referenced in question: {member_name}
- Latest recorded activity: {latest_activity}
- Snippets retrieved: {snippet_count}

Messages (grouped by member, oldest to newest):
{context}

Question: {question}

Respond exactly in this format:
Reasoning: <one sentence citing the most relevant snippet>
Answer: <final concise answer>";

/// Member label used when nobody was resolved
pub const UNKNOWN_MEMBER_LABEL: &str =
    "Name not explicitly mentioned; assume the member in the question.";

/// Template with `{name}` placeholders
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
    variables: Vec<String>,
}

impl PromptTemplate {
    /// Create a new prompt template
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let variables = extract_variables(&template);
        Self {
            template,
            variables,
        }
    }

    /// Fill in the template in one pass; unknown placeholders are left as
    /// written and inserted values are never rescanned.
    #[must_use]
    pub fn render(&self, values: &HashMap<&str, String>) -> String {
        let mut result = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('{') {
            result.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let filled = after.find('}').and_then(|close| {
                let name = &after[..close];
                if is_placeholder_name(name) {
                    values.get(name).map(|value| (value, close))
                } else {
                    None
                }
            });
            match filled {
                Some((value, close)) => {
                    result.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    result.push('{');
                    rest = after;
                }
            }
        }
        result.push_str(rest);
        result
    }

    #[must_use]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }
}

/// Placeholder names: identifier characters between single braces
fn extract_variables(template: &str) -> Vec<String> {
    let mut variables = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            break;
        };
        let name = &after[..close];
        if is_placeholder_name(name) && !variables.iter().any(|v| v == name) {
            variables.push(name.to_string());
        }
        rest = &after[close + 1..];
    }
    variables
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// System prompt and user template used for every question
#[derive(Debug, Clone)]
pub struct QaPrompts {
    pub system: String,
    pub user: PromptTemplate,
}

impl Default for QaPrompts {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
            user: PromptTemplate::new(DEFAULT_USER_TEMPLATE),
        }
    }
}

impl QaPrompts {
    /// Load configured prompt files, falling back to built-in text
    pub fn load(config: &PromptsConfig) -> Self {
        let system = config
            .system_prompt_path
            .as_deref()
            .and_then(read_prompt_file)
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        let user = config
            .user_template_path
            .as_deref()
            .and_then(read_prompt_file)
            .unwrap_or_else(|| DEFAULT_USER_TEMPLATE.to_string());
        Self {
            system,
            user: PromptTemplate::new(user),
        }
    }

    /// Render the user prompt for `question` over `context`
    pub fn render_user(
        &self,
        question: &str,
        members: &[&str],
        context: &AssembledContext,
    ) -> String {
        let member_name = if members.is_empty() {
            UNKNOWN_MEMBER_LABEL.to_string()
        } else {
            members.join(", ")
        };

        let mut values = HashMap::new();
        values.insert("member_name", member_name);
        values.insert("latest_activity", latest_activity(context));
        values.insert("snippet_count", context.item_count().to_string());
        values.insert("context", context.render());
        values.insert("question", question.to_string());
        self.user.render(&values)
    }
}

fn read_prompt_file(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Ok(_) => {
            warn!("Prompt file {} is empty, using fallback text", path.display());
            None
        }
        Err(e) => {
            warn!(
                "Prompt file not found at {} ({}), using fallback text",
                path.display(),
                e
            );
            None
        }
    }
}

/// `"<timestamp> - <preview>"` for the most recent snippet
fn latest_activity(context: &AssembledContext) -> String {
    let Some(latest) = context.latest_item() else {
        return "No activity found.".to_string();
    };
    let ts = latest
        .message
        .timestamp
        .as_ref()
        .map_or_else(|| "timestamp not provided".to_string(), format_timestamp);
    let text = latest.message.text.trim();
    if text.is_empty() {
        ts
    } else {
        format!("{ts} - {}", clip_text(text, LATEST_PREVIEW_CHARS))
    }
}

/// Keep only what follows the last `Answer:` marker, if there is one.
pub fn extract_final_answer(raw: &str) -> String {
    let raw = raw.trim();
    // ASCII lowercasing keeps byte offsets aligned with `raw`
    let lowered = raw.to_ascii_lowercase();
    let marker = "answer:";
    if let Some(idx) = lowered.rfind(marker) {
        let extracted = raw[idx + marker.len()..].trim();
        if !extracted.is_empty() {
            return extracted.to_string();
        }
    }
    raw.to_string()
}
