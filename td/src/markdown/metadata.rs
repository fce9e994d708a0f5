//! Inline metadata tokens embedded in checkbox text
//!
//! Recognized tokens, in any order:
//!
//! - `due: 2025-01-31` (also `期限:` and `deadline:`)
//! - `priority: high` (also `優先度:`; values `low|medium|high|低|中|高`)
//! - `#tag` (ASCII word characters plus Hiragana, Katakana and CJK ideographs)
//! - the generator's trailing `(created: YYYY-MM-DD[, completed: YYYY-MM-DD])`
//!
//! A backslash before `#`, `:`, `(` or another backslash makes that character
//! literal, so `Fix issue \#42` has the title `Fix issue #42` and no tags.
//! [`escape_metadata`] produces that form for titles the generator writes.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use taskstore::TaskPriority;
use tracing::debug;

use super::types::{MetadataPriority, TaskMetadata};

static DUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:due|期限|deadline):\s*(\d{4}-\d{2}-\d{2})").unwrap());

static PRIORITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:priority|優先度):\s*(low|medium|high|低|中|高)").unwrap());

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#([A-Za-z0-9_\x{3040}-\x{309F}\x{30A0}-\x{30FF}\x{4E00}-\x{9FAF}]+)").unwrap());

static STAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(created:\s*(\d{4}-\d{2}-\d{2})(?:,\s*completed:\s*(\d{4}-\d{2}-\d{2}))?\)").unwrap()
});

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Characters a backslash can escape
const ESCAPABLE: [char; 4] = ['\\', '#', ':', '('];

/// Private-use stand-ins for escaped characters while the token regexes run
const HELD: [char; 4] = ['\u{E000}', '\u{E001}', '\u{E002}', '\u{E003}'];

/// Pull metadata out of `text` and return the cleaned title alongside it
pub fn extract_metadata(text: &str) -> (String, TaskMetadata) {
    debug!(%text, "extract_metadata: called");
    let text = &hold_escapes(text);
    let mut metadata = TaskMetadata::default();

    if let Some(caps) = DUE_RE.captures(text) {
        metadata.due_date = Some(caps[1].to_string());
    }

    if let Some(caps) = PRIORITY_RE.captures(text) {
        metadata.priority = MetadataPriority::from_token(&caps[1]);
    }

    for caps in TAG_RE.captures_iter(text) {
        let tag = caps[1].to_string();
        if !metadata.tags.contains(&tag) {
            metadata.tags.push(tag);
        }
    }

    if let Some(caps) = STAMP_RE.captures(text) {
        metadata.created_date = Some(caps[1].to_string());
        metadata.completed_date = caps.get(2).map(|m| m.as_str().to_string());
    }

    (release_escapes(&strip_tokens(text)), metadata)
}

/// Strip every metadata token, collapse whitespace runs and resolve escapes
pub fn clean_title(text: &str) -> String {
    release_escapes(&strip_tokens(&hold_escapes(text)))
}

/// Backslash-escape everything in `text` the parser would read as metadata
///
/// `clean_title(&escape_metadata(t))` is `t` for any whitespace-normalized `t`.
pub fn escape_metadata(text: &str) -> String {
    let mut marks = BTreeSet::new();
    for m in TAG_RE.find_iter(text).chain(STAMP_RE.find_iter(text)) {
        marks.insert(m.start());
    }
    for re in [&*DUE_RE, &*PRIORITY_RE] {
        for m in re.find_iter(text) {
            if let Some(colon) = m.as_str().find(':') {
                marks.insert(m.start() + colon);
            }
        }
    }

    let mut out = String::with_capacity(text.len() + marks.len());
    for (i, c) in text.char_indices() {
        if c == '\\' || marks.contains(&i) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn strip_tokens(text: &str) -> String {
    let mut title = text.to_string();
    for re in [&*STAMP_RE, &*DUE_RE, &*PRIORITY_RE, &*TAG_RE] {
        title = re.replace_all(&title, "").into_owned();
    }
    WHITESPACE_RE.replace_all(&title, " ").trim().to_string()
}

fn hold_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\'
            && let Some(i) = chars.peek().and_then(|next| ESCAPABLE.iter().position(|e| e == next))
        {
            chars.next();
            out.push(HELD[i]);
            continue;
        }
        out.push(c);
    }
    out
}

fn release_escapes(text: &str) -> String {
    text.chars()
        .map(|c| match HELD.iter().position(|h| *h == c) {
            Some(i) => ESCAPABLE[i],
            None => c,
        })
        .collect()
}

/// Priority implied by the heading a task sits under
///
/// Matches the generator's own headings as well as hand-written ones such as
/// `## 高優先度` or `## Low priority`. Returns `None` for anything else.
pub fn section_priority(section: &str) -> Option<TaskPriority> {
    let section = section.to_lowercase();
    if section.contains("critical") || section.contains("最優先") {
        Some(TaskPriority::Critical)
    } else if section.contains("high") || section.contains('高') {
        Some(TaskPriority::High)
    } else if section.contains("medium") || section.contains('中') {
        Some(TaskPriority::Medium)
    } else if section.contains("low") || section.contains('低') {
        Some(TaskPriority::Low)
    } else {
        None
    }
}
