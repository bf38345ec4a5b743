//! Prompt templates for batch enrichment.
//!
//! A request template wraps the rendered group list (`{groups}`); the record
//! template is rendered once per group with `{num}` (1-based) and any
//! [`RecordField`] key as placeholders, e.g. `{name}` or `{fixed_post}`.
//! Placeholders are substituted in a single pass, so text coming from VK is
//! never re-expanded.

use crate::types::{EnrichmentMode, GroupRecord, RecordField};

const TAGS_SYSTEM_PROMPT: &str = "You are an analyst who labels VK communities by topic. \
You always answer with strict JSON and nothing else.";

const TAGS_REQUEST_TEMPLATE: &str = "Come up with 3 to 7 short topical tags for each VK group below, \
based on its name, description, status and pinned post. Answer with a JSON array that holds one \
array of tag strings per group, in the same order as the groups are listed. \
Example for two groups: [[\"travel\", \"hiking\"], [\"cooking\", \"recipes\"]]\n\n{groups}";

const SCORES_SYSTEM_PROMPT: &str = "You are an analyst who evaluates the audience of VK communities. \
You always answer with strict JSON and nothing else.";

const SCORES_REQUEST_TEMPLATE: &str = "Rate the audience of each VK group below on three scales from 1 to 10: \
solvency (how much money the audience is able to spend), progression (how open it is to new things) \
and self-education (how interested it is in learning). Answer with a JSON array that holds one array \
[solvency, progression, self_education] of integers per group, in the same order as the groups are listed. \
Example for two groups: [[7, 5, 8], [3, 4, 2]]\n\n{groups}";

const RECORD_TEMPLATE: &str = "Group {num} (id {id}):\nName: {name}\nDescription: {description}\n\
Status: {status}\nPinned post: {fixed_post}\n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub request: String,
    pub record: String,
}

impl PromptTemplate {
    pub fn new(request: impl Into<String>, record: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            record: record.into(),
        }
    }

    pub fn for_mode(mode: EnrichmentMode) -> Self {
        match mode {
            EnrichmentMode::Tags => Self::new(TAGS_REQUEST_TEMPLATE, RECORD_TEMPLATE),
            EnrichmentMode::Scores => Self::new(SCORES_REQUEST_TEMPLATE, RECORD_TEMPLATE),
        }
    }

    /// The numbered group list for a slice.
    pub fn render_records(&self, records: &[GroupRecord]) -> String {
        records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                render(&self.record, |key| match key {
                    "num" => Some((i + 1).to_string()),
                    other => RecordField::from_key(other).map(|field| field.text(record)),
                })
            })
            .collect()
    }

    /// The full user prompt for a slice.
    pub fn render(&self, records: &[GroupRecord]) -> String {
        let groups = self.render_records(records);
        render(&self.request, |key| (key == "groups").then(|| groups.clone()))
    }
}

pub fn default_system_prompt(mode: EnrichmentMode) -> &'static str {
    match mode {
        EnrichmentMode::Tags => TAGS_SYSTEM_PROMPT,
        EnrichmentMode::Scores => SCORES_SYSTEM_PROMPT,
    }
}

/// Substitute `{key}` placeholders using `lookup`. Unknown keys and
/// unmatched braces are kept literally.
fn render(template: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_placeholder_key(&after[..close]) => {
                let key = &after[..close];
                match lookup(key) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_placeholder_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
