//! MarkdownParser - reads the TODO dialect
//!
//! Parsing never fails: unrecognized constructs are skipped and an unclosed
//! front matter block is reported through a warning. Only [`MarkdownParser::validate`]
//! produces hard errors, and only for the size and task-count limits.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use super::metadata::extract_metadata;
use super::types::{
    CheckState, FrontMatter, FrontMatterValue, MarkdownCheckbox, MarkdownParseResult, MarkdownSection, ParsedTask,
    ValidationReport,
};
use crate::config::ParseLimits;

const FRONT_MATTER_DELIMITER: &str = "---";

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").unwrap());

static CHECKBOX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\s*)-\s+\[([xX~\s])\]\s+(.+)$").unwrap());

static INT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?\d+$").unwrap());

static FLOAT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?\d+\.\d+$").unwrap());

/// Tasks grouped under the heading they appear beneath
#[derive(Debug, Clone, PartialEq)]
pub struct TaskGroup {
    /// `None` for checkboxes above the first heading
    pub section: Option<String>,
    pub tasks: Vec<ParsedTask>,
}

/// Where the front matter scan ended up
enum FrontMatterScan {
    Absent,
    Unclosed,
    Closed { values: FrontMatter, body_start: usize },
}

#[derive(Debug, Clone, Default)]
pub struct MarkdownParser {
    limits: ParseLimits,
}

impl MarkdownParser {
    pub fn new(limits: ParseLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> ParseLimits {
        self.limits
    }

    /// Parse raw bytes; non-UTF-8 input yields an empty result
    pub fn parse_bytes(&self, bytes: &[u8]) -> MarkdownParseResult {
        match std::str::from_utf8(bytes) {
            Ok(content) => self.parse(content),
            Err(e) => {
                warn!(error = %e, "MarkdownParser::parse_bytes: content is not valid UTF-8, returning empty result");
                MarkdownParseResult::default()
            }
        }
    }

    /// Parse a document into front matter, sections and checkboxes
    pub fn parse(&self, content: &str) -> MarkdownParseResult {
        debug!(len = content.len(), "MarkdownParser::parse: called");
        let lines = split_lines(content);

        let (front_matter, body_start) = match scan_front_matter(&lines) {
            FrontMatterScan::Absent => (None, 0),
            FrontMatterScan::Unclosed => {
                warn!("Front matter opened with '---' but never closed; ignoring it");
                (None, 0)
            }
            FrontMatterScan::Closed { values, body_start } => (Some(values), body_start),
        };

        let sections = parse_sections(&lines, body_start);
        let checkboxes = parse_checkboxes(&lines, body_start);
        debug!(
            sections = sections.len(),
            checkboxes = checkboxes.len(),
            "MarkdownParser::parse: done"
        );

        MarkdownParseResult {
            front_matter,
            sections,
            checkboxes,
            raw_content: content.to_string(),
            line_count: lines.len(),
            char_count: content.chars().count(),
        }
    }

    /// Turn every checkbox into a task with metadata split out of its title
    pub fn extract_tasks(&self, result: &MarkdownParseResult) -> Vec<ParsedTask> {
        result.checkboxes.iter().map(to_parsed_task).collect()
    }

    /// Tasks grouped by section, groups in order of first appearance
    pub fn extract_tasks_by_section(&self, result: &MarkdownParseResult) -> Vec<TaskGroup> {
        let mut groups: Vec<TaskGroup> = Vec::new();
        for task in self.extract_tasks(result) {
            match groups.iter_mut().find(|g| g.section == task.section) {
                Some(group) => group.tasks.push(task),
                None => groups.push(TaskGroup {
                    section: task.section.clone(),
                    tasks: vec![task],
                }),
            }
        }
        groups
    }

    /// Structural lint, separate from parsing
    pub fn validate(&self, content: &str) -> ValidationReport {
        debug!(len = content.len(), "MarkdownParser::validate: called");
        let mut report = ValidationReport::default();

        if content.trim().is_empty() {
            report.errors.push("Content is empty".to_string());
            return report;
        }

        let size = content.len() as u64;
        if size > self.limits.max_file_size_bytes() {
            report.errors.push(format!(
                "File size ({:.2} MB) exceeds maximum ({} MB)",
                size as f64 / (1024.0 * 1024.0),
                self.limits.max_file_size_mb
            ));
        }

        let lines = split_lines(content);

        let checkbox_count = lines.iter().filter(|l| CHECKBOX_RE.is_match(l)).count();
        if checkbox_count > self.limits.max_tasks {
            report.errors.push(format!(
                "Task count ({}) exceeds maximum ({})",
                checkbox_count, self.limits.max_tasks
            ));
        }

        if matches!(scan_front_matter(&lines), FrontMatterScan::Unclosed) {
            report
                .warnings
                .push("Front matter is not closed with '---'".to_string());
        }

        let mut previous: Option<usize> = None;
        for (line_no, line) in lines.iter().enumerate() {
            let Some(caps) = HEADING_RE.captures(line) else {
                continue;
            };
            let level = caps[1].len();
            if let Some(prev) = previous
                && level > prev + 1
            {
                report.warnings.push(format!(
                    "Heading level jumps from {} to {} at line {}",
                    prev,
                    level,
                    line_no + 1
                ));
            }
            previous = Some(level);
        }

        report.valid = report.errors.is_empty();
        report
    }
}

fn split_lines(content: &str) -> Vec<&str> {
    content.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l)).collect()
}

fn scan_front_matter(lines: &[&str]) -> FrontMatterScan {
    if lines.first().copied() != Some(FRONT_MATTER_DELIMITER) {
        return FrontMatterScan::Absent;
    }

    let Some(close) = lines.iter().skip(1).position(|l| *l == FRONT_MATTER_DELIMITER) else {
        return FrontMatterScan::Unclosed;
    };
    let close = close + 1;

    let mut values = FrontMatter::new();
    for line in &lines[1..close] {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || key.starts_with('#') {
            continue;
        }
        values.insert(key.to_string(), parse_scalar(value.trim()));
    }

    FrontMatterScan::Closed {
        values,
        body_start: close + 1,
    }
}

/// Infer bool, int, float or (unquoted) string
fn parse_scalar(raw: &str) -> FrontMatterValue {
    match raw {
        "true" => return FrontMatterValue::Bool(true),
        "false" => return FrontMatterValue::Bool(false),
        _ => {}
    }
    if INT_RE.is_match(raw)
        && let Ok(i) = raw.parse()
    {
        return FrontMatterValue::Int(i);
    }
    if FLOAT_RE.is_match(raw)
        && let Ok(f) = raw.parse()
    {
        return FrontMatterValue::Float(f);
    }
    FrontMatterValue::String(strip_quotes(raw).to_string())
}

fn strip_quotes(raw: &str) -> &str {
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

struct Heading {
    line: usize,
    level: usize,
    name: String,
}

fn parse_sections(lines: &[&str], body_start: usize) -> Vec<MarkdownSection> {
    let headings: Vec<Heading> = lines
        .iter()
        .enumerate()
        .skip(body_start)
        .filter_map(|(line, text)| {
            HEADING_RE.captures(text).map(|caps| Heading {
                line,
                level: caps[1].len(),
                name: caps[2].trim().to_string(),
            })
        })
        .collect();

    if headings.is_empty() {
        return Vec::new();
    }

    let last_line = lines.len().saturating_sub(1);
    let flat: Vec<MarkdownSection> = headings
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let end_line = headings[i + 1..]
                .iter()
                .find(|next| next.level <= h.level)
                .map(|next| next.line - 1)
                .unwrap_or(last_line);
            let content = if h.line < end_line {
                lines[h.line + 1..=end_line].join("\n")
            } else {
                String::new()
            };
            MarkdownSection {
                name: h.name.clone(),
                level: h.level,
                start_line: h.line,
                end_line,
                content,
                children: Vec::new(),
            }
        })
        .collect();

    // Level-ordered stack: pop anything at our level or deeper, the remaining
    // top is the parent.
    let mut parents: Vec<Option<usize>> = Vec::with_capacity(flat.len());
    let mut stack: Vec<usize> = Vec::new();
    for (i, section) in flat.iter().enumerate() {
        while stack.last().is_some_and(|&top| flat[top].level >= section.level) {
            stack.pop();
        }
        parents.push(stack.last().copied());
        stack.push(i);
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); flat.len()];
    let mut roots = Vec::new();
    for (i, parent) in parents.iter().enumerate() {
        match parent {
            Some(p) => children[*p].push(i),
            None => roots.push(i),
        }
    }

    roots.into_iter().map(|i| assemble(i, &flat, &children)).collect()
}

fn assemble(index: usize, flat: &[MarkdownSection], children: &[Vec<usize>]) -> MarkdownSection {
    let mut section = flat[index].clone();
    section.children = children[index].iter().map(|&c| assemble(c, flat, children)).collect();
    section
}

fn parse_checkboxes(lines: &[&str], body_start: usize) -> Vec<MarkdownCheckbox> {
    let mut current_section: Option<String> = None;
    let mut checkboxes = Vec::new();

    for (line_number, line) in lines.iter().enumerate().skip(body_start) {
        if let Some(caps) = HEADING_RE.captures(line) {
            current_section = Some(caps[2].trim().to_string());
            continue;
        }

        let Some(caps) = CHECKBOX_RE.captures(line) else {
            continue;
        };
        let Some(state) = caps[2].chars().next().and_then(CheckState::from_marker) else {
            continue;
        };

        checkboxes.push(MarkdownCheckbox {
            checked: state == CheckState::Done,
            in_progress: state == CheckState::InProgress,
            text: caps[3].trim().to_string(),
            line_number,
            indent_level: caps[1].len() / 2,
            section: current_section.clone(),
        });
    }

    checkboxes
}

fn to_parsed_task(checkbox: &MarkdownCheckbox) -> ParsedTask {
    let (title, metadata) = extract_metadata(&checkbox.text);
    ParsedTask {
        title,
        checked: checkbox.checked,
        in_progress: checkbox.in_progress,
        line_number: checkbox.line_number,
        section: checkbox.section.clone(),
        indent_level: checkbox.indent_level,
        raw_text: checkbox.text.clone(),
        metadata,
    }
}
