use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::EnrichError;

/// One VK community, from the spreadsheet row it was read from to the row
/// it is written back to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupRecord {
    column_index: Option<u32>,
    id: String,
    pub name: String,
    pub description: String,
    /// Resolved text of the pinned (or latest) wall post, not the post id.
    pub fixed_post: String,
    pub status: String,
    /// Comma-joined generated labels (tags mode).
    pub tags: Option<String>,
    pub solvency: Option<i64>,
    pub progression: Option<i64>,
    pub self_education: Option<i64>,
}

impl GroupRecord {
    pub fn new(column_index: u32, id: impl Into<String>) -> Self {
        Self {
            column_index: Some(column_index),
            id: id.into(),
            ..Default::default()
        }
    }

    /// Spreadsheet row this record is written back to.
    pub fn column_index(&self) -> Option<u32> {
        self.column_index
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_resolved(&self) -> bool {
        !self.name.is_empty()
    }

    pub fn has_generated_attributes(&self) -> bool {
        self.tags.is_some()
            || self.solvency.is_some()
            || self.progression.is_some()
            || self.self_education.is_some()
    }
}

/// A record field that can be rendered into a prompt or a spreadsheet cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    Id,
    Name,
    Description,
    FixedPost,
    Status,
    Tags,
    Solvency,
    Progression,
    SelfEducation,
}

impl RecordField {
    pub fn key(self) -> &'static str {
        match self {
            RecordField::Id => "id",
            RecordField::Name => "name",
            RecordField::Description => "description",
            RecordField::FixedPost => "fixed_post",
            RecordField::Status => "status",
            RecordField::Tags => "tags",
            RecordField::Solvency => "solvency",
            RecordField::Progression => "progression",
            RecordField::SelfEducation => "self_education",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.key() == key)
    }

    pub const ALL: [RecordField; 9] = [
        RecordField::Id,
        RecordField::Name,
        RecordField::Description,
        RecordField::FixedPost,
        RecordField::Status,
        RecordField::Tags,
        RecordField::Solvency,
        RecordField::Progression,
        RecordField::SelfEducation,
    ];

    /// Cell value for this field. Unset attributes become empty cells.
    pub fn cell(self, record: &GroupRecord) -> Value {
        fn score(value: Option<i64>) -> Value {
            value.map(Value::from).unwrap_or_else(|| Value::from(""))
        }

        match self {
            RecordField::Id => Value::from(record.id()),
            RecordField::Name => Value::from(record.name.as_str()),
            RecordField::Description => Value::from(record.description.as_str()),
            RecordField::FixedPost => Value::from(record.fixed_post.as_str()),
            RecordField::Status => Value::from(record.status.as_str()),
            RecordField::Tags => Value::from(record.tags.as_deref().unwrap_or_default()),
            RecordField::Solvency => score(record.solvency),
            RecordField::Progression => score(record.progression),
            RecordField::SelfEducation => score(record.self_education),
        }
    }

    /// Text of this field as embedded into a prompt.
    pub fn text(self, record: &GroupRecord) -> String {
        match self.cell(record) {
            Value::String(s) => s,
            other => other.to_string(),
        }
    }

    /// Store a generated score. Non-score fields are left untouched.
    pub fn set_score(self, record: &mut GroupRecord, value: Option<i64>) {
        match self {
            RecordField::Solvency => record.solvency = value,
            RecordField::Progression => record.progression = value,
            RecordField::SelfEducation => record.self_education = value,
            _ => {}
        }
    }
}

/// What the LLM is asked to generate for each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnrichmentMode {
    /// Comma-joined topical labels.
    #[default]
    Tags,
    /// Solvency, progression and self-education scores.
    Scores,
}

impl EnrichmentMode {
    /// Columns written back to the sheet, left to right.
    pub fn upload_fields(self) -> &'static [RecordField] {
        match self {
            EnrichmentMode::Tags => &[
                RecordField::Id,
                RecordField::Name,
                RecordField::Description,
                RecordField::FixedPost,
                RecordField::Status,
                RecordField::Tags,
            ],
            EnrichmentMode::Scores => &[
                RecordField::Id,
                RecordField::Name,
                RecordField::Description,
                RecordField::FixedPost,
                RecordField::Status,
                RecordField::Solvency,
                RecordField::Progression,
                RecordField::SelfEducation,
            ],
        }
    }

    /// Attributes the model fills in, in the order each reply entry lists them.
    pub fn generated_fields(self) -> &'static [RecordField] {
        match self {
            EnrichmentMode::Tags => &[RecordField::Tags],
            EnrichmentMode::Scores => &[
                RecordField::Solvency,
                RecordField::Progression,
                RecordField::SelfEducation,
            ],
        }
    }
}

impl fmt::Display for EnrichmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrichmentMode::Tags => write!(f, "tags"),
            EnrichmentMode::Scores => write!(f, "scores"),
        }
    }
}

impl FromStr for EnrichmentMode {
    type Err = EnrichError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tags" => Ok(EnrichmentMode::Tags),
            "scores" => Ok(EnrichmentMode::Scores),
            other => Err(EnrichError::Config(format!(
                "unknown enrichment mode {other:?} (expected \"tags\" or \"scores\")"
            ))),
        }
    }
}
