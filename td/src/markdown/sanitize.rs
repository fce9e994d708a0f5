//! Text cleaning applied to everything the generator writes

use std::sync::LazyLock;

use regex::Regex;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").unwrap());

static SCHEME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(javascript|vbscript|data):").unwrap());

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Longest title the generator will emit
pub const MAX_TITLE_CHARS: usize = 500;

/// Cleans user-controlled text before it is written into the TODO file
pub trait Sanitizer: Send + Sync {
    fn sanitize_title(&self, title: &str) -> String;

    fn sanitize_section(&self, section: &str) -> String;

    /// Tag names must survive a re-parse as a single `#token`
    fn sanitize_tag(&self, tag: &str) -> String {
        self.sanitize_section(tag)
            .chars()
            .map(|c| if is_tag_char(c) { c } else { '_' })
            .collect()
    }
}

fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c == '_'
        || ('\u{3040}'..='\u{309F}').contains(&c)
        || ('\u{30A0}'..='\u{30FF}').contains(&c)
        || ('\u{4E00}'..='\u{9FAF}').contains(&c)
}

/// Strips markup, script payloads, URL schemes and line breaks
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlSanitizer;

impl HtmlSanitizer {
    fn clean(&self, text: &str) -> String {
        let text = SCRIPT_RE.replace_all(text, "");
        let text = TAG_RE.replace_all(&text, "");
        let text = SCHEME_RE.replace_all(&text, "");
        let text: String = text.chars().filter(|c| !c.is_control() || c.is_whitespace()).collect();
        WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
    }
}

impl Sanitizer for HtmlSanitizer {
    fn sanitize_title(&self, title: &str) -> String {
        self.clean(title).chars().take(MAX_TITLE_CHARS).collect()
    }

    fn sanitize_section(&self, section: &str) -> String {
        self.clean(section).trim_start_matches('#').trim().to_string()
    }
}
