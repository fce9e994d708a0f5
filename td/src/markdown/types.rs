//! Parse result types for the TODO Markdown dialect

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use taskstore::TaskPriority;

/// A typed scalar from the front matter block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrontMatterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl FrontMatterValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl std::fmt::Display for FrontMatterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

/// Key/value pairs from the front matter, in key order
pub type FrontMatter = BTreeMap<String, FrontMatterValue>;

/// A heading and everything beneath it until the next heading of equal or
/// higher rank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkdownSection {
    /// Heading text without the leading `#`s
    pub name: String,
    /// 1 through 6
    pub level: usize,
    /// 0-based line of the heading
    pub start_line: usize,
    /// 0-based last line belonging to the section
    pub end_line: usize,
    /// Lines after the heading up to `end_line`, joined with `\n`
    pub content: String,
    pub children: Vec<MarkdownSection>,
}

impl MarkdownSection {
    /// Depth-first search by heading text
    pub fn find(&self, name: &str) -> Option<&MarkdownSection> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }
}

/// Tri-state checkbox marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckState {
    /// `[ ]`
    #[default]
    Open,
    /// `[~]`
    InProgress,
    /// `[x]` / `[X]`
    Done,
}

impl CheckState {
    pub fn from_marker(marker: char) -> Option<Self> {
        match marker {
            'x' | 'X' => Some(Self::Done),
            '~' => Some(Self::InProgress),
            c if c.is_whitespace() => Some(Self::Open),
            _ => None,
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Self::Open => "[ ]",
            Self::InProgress => "[~]",
            Self::Done => "[x]",
        }
    }
}

/// A checkbox list item as found in the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkdownCheckbox {
    pub checked: bool,
    /// `[~]` marker; `checked` is false for these
    pub in_progress: bool,
    /// Text after the marker, metadata included
    pub text: String,
    /// 0-based line number
    pub line_number: usize,
    /// `floor(leading_spaces / 2)`
    pub indent_level: usize,
    /// Most recent heading above the checkbox
    pub section: Option<String>,
}

impl MarkdownCheckbox {
    pub fn state(&self) -> CheckState {
        if self.checked {
            CheckState::Done
        } else if self.in_progress {
            CheckState::InProgress
        } else {
            CheckState::Open
        }
    }
}

/// Lower-case priority as written inline (`priority: high`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataPriority {
    Low,
    Medium,
    High,
}

impl MetadataPriority {
    /// Map an inline token (English or Japanese) to a priority
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_lowercase().as_str() {
            "low" | "低" => Some(Self::Low),
            "medium" | "中" => Some(Self::Medium),
            "high" | "高" => Some(Self::High),
            _ => None,
        }
    }
}

impl From<MetadataPriority> for TaskPriority {
    fn from(priority: MetadataPriority) -> Self {
        match priority {
            MetadataPriority::Low => TaskPriority::Low,
            MetadataPriority::Medium => TaskPriority::Medium,
            MetadataPriority::High => TaskPriority::High,
        }
    }
}

impl std::fmt::Display for MetadataPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Inline metadata pulled out of a checkbox's text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<MetadataPriority>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// From a generated `(created: ...)` suffix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    /// From a generated `(..., completed: ...)` suffix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_date: Option<String>,
}

impl TaskMetadata {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// `due_date` as a calendar date, if it is one
    pub fn due(&self) -> Option<NaiveDate> {
        self.due_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
    }
}

/// A task derived from a checkbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTask {
    /// Text with every metadata token removed and whitespace collapsed
    pub title: String,
    pub checked: bool,
    pub in_progress: bool,
    pub line_number: usize,
    pub section: Option<String>,
    pub indent_level: usize,
    /// Checkbox text before cleaning
    pub raw_text: String,
    pub metadata: TaskMetadata,
}

impl ParsedTask {
    pub fn state(&self) -> CheckState {
        if self.checked {
            CheckState::Done
        } else if self.in_progress {
            CheckState::InProgress
        } else {
            CheckState::Open
        }
    }
}

/// Everything `MarkdownParser::parse` extracts from one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkdownParseResult {
    /// Present only when the document opens and closes a `---` block
    pub front_matter: Option<FrontMatter>,
    /// Root-level sections; nested ones hang off `children`
    pub sections: Vec<MarkdownSection>,
    pub checkboxes: Vec<MarkdownCheckbox>,
    pub raw_content: String,
    pub line_count: usize,
    pub char_count: usize,
}

/// Outcome of the structural linter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_state_markers() {
        assert_eq!(CheckState::from_marker('x'), Some(CheckState::Done));
        assert_eq!(CheckState::from_marker('X'), Some(CheckState::Done));
        assert_eq!(CheckState::from_marker('~'), Some(CheckState::InProgress));
        assert_eq!(CheckState::from_marker(' '), Some(CheckState::Open));
        assert_eq!(CheckState::from_marker('?'), None);
        assert_eq!(CheckState::InProgress.marker(), "[~]");
    }

    #[test]
    fn test_metadata_priority_tokens() {
        assert_eq!(MetadataPriority::from_token("HIGH"), Some(MetadataPriority::High));
        assert_eq!(MetadataPriority::from_token("中"), Some(MetadataPriority::Medium));
        assert_eq!(MetadataPriority::from_token("低"), Some(MetadataPriority::Low));
        assert_eq!(MetadataPriority::from_token("urgent"), None);
    }

    #[test]
    fn test_front_matter_value_serde_untagged() {
        let value: FrontMatterValue = serde_json::from_str("42").unwrap();
        assert_eq!(value, FrontMatterValue::Int(42));
        let value: FrontMatterValue = serde_json::from_str("\"hi\"").unwrap();
        assert_eq!(value.as_str(), Some("hi"));
        assert_eq!(FrontMatterValue::Int(3).as_float(), Some(3.0));
    }

    #[test]
    fn test_section_find() {
        let section = MarkdownSection {
            name: "A".to_string(),
            level: 1,
            start_line: 0,
            end_line: 1,
            content: String::new(),
            children: vec![MarkdownSection {
                name: "B".to_string(),
                level: 2,
                start_line: 1,
                end_line: 1,
                content: String::new(),
                children: vec![],
            }],
        };
        assert_eq!(section.find("B").map(|s| s.level), Some(2));
        assert!(section.find("C").is_none());
    }

    #[test]
    fn test_metadata_due_parse() {
        let meta = TaskMetadata {
            due_date: Some("2025-12-31".to_string()),
            ..Default::default()
        };
        assert_eq!(meta.due(), NaiveDate::from_ymd_opt(2025, 12, 31));
        assert!(!meta.is_empty());
        assert!(TaskMetadata::default().is_empty());
    }
}
