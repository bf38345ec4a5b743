use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ai_client::{strip_code_blocks, Message};
use anyhow::Result;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::EnrichError;
use crate::ids::leading_integer;
use crate::prompt::{default_system_prompt, PromptTemplate};
use crate::retry::retry;
use crate::traits::CompletionClient;
use crate::types::{EnrichmentMode, GroupRecord};

/// Output of one enrichment task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedSlice {
    pub records: Vec<GroupRecord>,
    /// False when every attempt failed and `records` is the untouched input.
    pub enriched: bool,
}

impl EnrichedSlice {
    pub fn degraded(records: Vec<GroupRecord>) -> Self {
        Self {
            records,
            enriched: false,
        }
    }
}

/// Generates tags or scores for a slice of records with one LLM request.
pub struct Enricher {
    client: Arc<dyn CompletionClient>,
    mode: EnrichmentMode,
    template: PromptTemplate,
    system_prompt: Option<String>,
    max_attempts: usize,
}

impl Enricher {
    pub fn new(client: Arc<dyn CompletionClient>, mode: EnrichmentMode) -> Self {
        Self {
            client,
            mode,
            template: PromptTemplate::for_mode(mode),
            system_prompt: Some(default_system_prompt(mode).to_string()),
            max_attempts: 3,
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Replace the system-role message; `None` sends the user prompt alone.
    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn mode(&self) -> EnrichmentMode {
        self.mode
    }

    /// Conversation sent for a slice: optional system message, then the prompt.
    pub fn messages(&self, records: &[GroupRecord]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(Message::system(system.as_str()));
        }
        messages.push(Message::user(self.template.render(records)));
        messages
    }

    /// Enrich a slice, retrying the whole slice on any failure. Once attempts
    /// are exhausted the slice is returned unmodified.
    pub async fn enrich(&self, slice: Vec<GroupRecord>) -> EnrichedSlice {
        let first_row = slice.first().and_then(GroupRecord::column_index);

        let outcome = retry("enrichment", self.max_attempts, Duration::ZERO, |_| {
            self.attempt(&slice)
        })
        .await;

        match outcome {
            Ok(records) => {
                debug!(first_row, records = records.len(), "Slice enriched");
                EnrichedSlice {
                    records,
                    enriched: true,
                }
            }
            Err(e) => {
                warn!(
                    first_row,
                    records = slice.len(),
                    attempts = self.max_attempts,
                    error = %e,
                    "There was an error during enrichment; sending slice without generated attributes"
                );
                EnrichedSlice::degraded(slice)
            }
        }
    }

    async fn attempt(&self, slice: &[GroupRecord]) -> Result<Vec<GroupRecord>> {
        let reply = self.client.complete(&self.messages(slice)).await?;
        let entries = match self.mode {
            EnrichmentMode::Tags => parse_reply(&reply, slice.len())?,
            EnrichmentMode::Scores => parse_scores(&reply, slice.len())?,
        };

        let mut records = slice.to_vec();
        assign(self.mode, &mut records, entries);
        Ok(records)
    }
}

impl fmt::Debug for Enricher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enricher")
            .field("mode", &self.mode)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

/// Parse a reply into one attribute list per record. Replies with more
/// entries than records can't be mapped back and are rejected.
pub fn parse_reply(reply: &str, expected: usize) -> Result<Vec<Vec<Value>>, EnrichError> {
    let cleaned = strip_code_blocks(reply);
    let entries: Vec<Vec<Value>> = serde_json::from_str(cleaned).map_err(|e| {
        EnrichError::Parse(format!("reply is not a JSON array of arrays ({e}): {}", preview(cleaned)))
    })?;

    if entries.len() > expected {
        return Err(EnrichError::Parse(format!(
            "reply has {} entries for {expected} groups",
            entries.len()
        )));
    }
    Ok(entries)
}

/// Scores may come back as JSON arrays or as free text. Free text is read
/// one line per record, each line's leading integer scoring the first
/// generated field; a single-record slice reads the whole reply.
pub fn parse_scores(reply: &str, expected: usize) -> Result<Vec<Vec<Value>>, EnrichError> {
    let cleaned = strip_code_blocks(reply).trim();
    if cleaned.starts_with('[') {
        return parse_reply(cleaned, expected);
    }

    let lines: Vec<&str> = if expected <= 1 {
        vec![cleaned]
    } else {
        cleaned.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
    };
    if lines.len() > expected {
        return Err(EnrichError::Parse(format!(
            "reply has {} lines for {expected} groups",
            lines.len()
        )));
    }

    let entries: Vec<Vec<Value>> = lines
        .iter()
        .map(|line| leading_integer(line).map(Value::from).into_iter().collect())
        .collect();
    if entries.iter().all(Vec::is_empty) {
        return Err(EnrichError::Parse(format!("reply has no score: {}", preview(cleaned))));
    }
    Ok(entries)
}

/// Write parsed entries onto records in order. Records past the end of
/// `entries` get no generated attributes.
pub fn assign(mode: EnrichmentMode, records: &mut [GroupRecord], entries: Vec<Vec<Value>>) {
    let mut entries = entries.into_iter();
    for record in records.iter_mut() {
        let entry = entries.next();
        match mode {
            EnrichmentMode::Tags => record.tags = entry.as_deref().and_then(join_tags),
            EnrichmentMode::Scores => {
                for (i, field) in mode.generated_fields().iter().enumerate() {
                    let score = entry.as_ref().and_then(|e| e.get(i)).and_then(score_value);
                    field.set_score(record, score);
                }
            }
        }
    }
}

fn join_tags(labels: &[Value]) -> Option<String> {
    let labels: Vec<String> = labels
        .iter()
        .filter_map(|label| match label {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|label| !label.is_empty())
        .collect();

    (!labels.is_empty()).then(|| labels.join(", "))
}

fn score_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => leading_integer(s),
        _ => None,
    }
}

fn preview(text: &str) -> String {
    let head = ai_client::truncate_chars(text, 120);
    if head.len() < text.len() {
        format!("{head}…")
    } else {
        head.to_string()
    }
}
