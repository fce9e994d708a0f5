//! TODO Markdown dialect: parsing, metadata extraction and generation

mod generator;
mod metadata;
mod parser;
mod sanitize;
mod types;

pub use generator::{COMPLETED_SECTION, GenerateError, MarkdownGenerator, priority_heading};
pub use metadata::{clean_title, escape_metadata, extract_metadata, section_priority};
pub use parser::{MarkdownParser, TaskGroup};
pub use sanitize::{HtmlSanitizer, MAX_TITLE_CHARS, Sanitizer};
pub use types::{
    CheckState, FrontMatter, FrontMatterValue, MarkdownCheckbox, MarkdownParseResult, MarkdownSection,
    MetadataPriority, ParsedTask, TaskMetadata, ValidationReport,
};
