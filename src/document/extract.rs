//! Text extraction from uploaded documents.
//!
//! This is the stateless processing routine the pool runs off the request
//! thread. It is also callable directly, which is how the synchronous fallback
//! produces identical output.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{ProcessingError, TaskMetadata, WorkerExecutor};

/// Raw document bytes plus a media type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Raw uploaded bytes.
    pub bytes: Arc<[u8]>,
    /// Media type tag, e.g. `text/html`.
    pub kind: String,
}

impl Document {
    /// Build a document from bytes and a media type tag.
    pub fn new(bytes: impl Into<Arc<[u8]>>, kind: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            kind: kind.into(),
        }
    }
}

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// `text/plain`
    PlainText,
    /// `text/markdown`
    Markdown,
    /// `text/html`
    Html,
}

impl DocumentKind {
    /// Resolve a media type tag, ignoring parameters such as `charset`.
    ///
    /// # Errors
    ///
    /// Returns `ExtractError::UnsupportedKind` for unknown tags.
    pub fn from_media_type(tag: &str) -> Result<Self, ExtractError> {
        let essence = tag.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "text/plain" | "txt" => Ok(Self::PlainText),
            "text/markdown" | "text/x-markdown" | "md" => Ok(Self::Markdown),
            "text/html" | "application/xhtml+xml" | "html" => Ok(Self::Html),
            _ => Err(ExtractError::UnsupportedKind(tag.to_string())),
        }
    }
}

/// Reasons a document cannot be turned into text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// The type tag names a format this routine does not handle.
    #[error("unsupported document type: {0}")]
    UnsupportedKind(String),
    /// The bytes are not valid UTF-8.
    #[error("document is not valid UTF-8 (at byte {0})")]
    InvalidEncoding(usize),
    /// Nothing readable was left after extraction.
    #[error("document contains no text")]
    Empty,
}

impl From<ExtractError> for ProcessingError {
    fn from(err: ExtractError) -> Self {
        Self::new(err.to_string())
    }
}

/// Extract normalized plain text from a document.
///
/// # Errors
///
/// See [`ExtractError`].
pub fn extract_text(doc: &Document) -> Result<String, ExtractError> {
    let kind = DocumentKind::from_media_type(&doc.kind)?;
    let raw = std::str::from_utf8(&doc.bytes).map_err(|e| ExtractError::InvalidEncoding(e.valid_up_to()))?;
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    let text = match kind {
        DocumentKind::PlainText => raw.to_string(),
        DocumentKind::Markdown => strip_markdown(raw),
        DocumentKind::Html => strip_html(raw),
    };

    let normalized = normalize_whitespace(&text);
    if normalized.is_empty() {
        return Err(ExtractError::Empty);
    }
    Ok(normalized)
}

/// Collapse runs of spaces, trim lines and keep at most one blank line.
fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;

    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_run > 0 {
                out.push('\n');
            }
        }
        blank_run = 0;
        out.push_str(&collapsed);
    }
    out
}

fn strip_markdown(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_fence = false;

    for line in raw.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            out.push_str(line);
            out.push('\n');
            continue;
        }

        let body = strip_heading(trimmed);
        let body = body.strip_prefix('>').map_or(body, str::trim_start);
        let body = body
            .strip_prefix("- ")
            .or_else(|| body.strip_prefix("* "))
            .or_else(|| body.strip_prefix("+ "))
            .unwrap_or(body);
        if is_rule(body) {
            out.push('\n');
            continue;
        }
        out.push_str(&strip_inline_markdown(body));
        out.push('\n');
    }
    out
}

fn is_rule(line: &str) -> bool {
    let t = line.trim();
    t.len() >= 3 && (t.chars().all(|c| c == '-') || t.chars().all(|c| c == '*') || t.chars().all(|c| c == '_'))
}

/// ATX heading marker: one to six `#` followed by a space, or a bare run.
fn strip_heading(line: &str) -> &str {
    let hashes = line.len() - line.trim_start_matches('#').len();
    if !(1..=6).contains(&hashes) {
        return line;
    }
    match line[hashes..].strip_prefix(' ') {
        Some(text) => text,
        None if hashes == line.len() => "",
        None => line,
    }
}

/// Drop emphasis markers and reduce `[text](url)` / `![alt](url)` to their text.
fn strip_inline_markdown(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' | '_' | '`' if is_emphasis_marker(&chars, i) => {}
            '!' if chars.get(i + 1) == Some(&'[') => {}
            '[' => {
                let label_end = chars[i + 1..]
                    .iter()
                    .position(|&c| c == ']')
                    .map_or(chars.len(), |at| i + 1 + at);
                let label: String = chars[i + 1..label_end].iter().collect();
                out.push_str(&strip_inline_markdown(&label));
                i = label_end;
                if chars.get(i + 1) == Some(&'(') {
                    i = chars[i + 1..]
                        .iter()
                        .position(|&c| c == ')')
                        .map_or(chars.len(), |at| i + 1 + at);
                }
            }
            c => out.push(c),
        }
        i += 1;
    }
    out
}

/// A marker inside a word (`jane_doe`, `snake_case`) is literal text.
fn is_emphasis_marker(chars: &[char], at: usize) -> bool {
    let in_word = |c: Option<&char>| c.is_some_and(|c| c.is_alphanumeric());
    let before = at.checked_sub(1).and_then(|i| chars.get(i));
    !(in_word(before) && in_word(chars.get(at + 1)))
}

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "tr", "table", "section", "article", "header", "footer",
    "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre",
];

fn strip_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find('<') {
        out.push_str(&decode_entities(&rest[..start]));
        let after = &rest[start + 1..];

        let opens_tag = after
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '/' || c == '!');
        if !opens_tag {
            out.push('<');
            rest = after;
            continue;
        }

        if let Some(comment) = after.strip_prefix("!--") {
            rest = comment.find("-->").map_or("", |end| &comment[end + 3..]);
            continue;
        }

        let Some(end) = after.find('>') else {
            rest = "";
            break;
        };
        let tag = &after[..end];
        rest = &after[end + 1..];

        let name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();

        if !tag.starts_with('/') && (name == "script" || name == "style") {
            let close = format!("</{name}");
            let body = rest;
            rest = find_ascii_ci(body, &close).map_or("", |at| {
                let tail = &body[at..];
                tail.find('>').map_or("", |gt| &tail[gt + 1..])
            });
            continue;
        }
        if BLOCK_TAGS.contains(&name.as_str()) {
            out.push('\n');
        }
    }
    out.push_str(&decode_entities(rest));
    out
}

fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle.as_bytes()))
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|&semi| semi <= 10).and_then(|semi| {
            let entity = &tail[1..semi];
            decode_entity(entity).map(|c| (c, semi + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        "ndash" => Some('\u{2013}'),
        "mdash" => Some('\u{2014}'),
        _ => {
            let num = entity.strip_prefix('#')?;
            let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// [`WorkerExecutor`] running [`extract_text`] on pool threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextExtractor;

#[async_trait]
impl WorkerExecutor<Document, String> for TextExtractor {
    async fn process(&self, doc: Document, meta: TaskMetadata) -> Result<String, ProcessingError> {
        tracing::trace!(task_id = meta.id, kind = %doc.kind, bytes = doc.bytes.len(), "Extracting text");
        extract_text(&doc).map_err(ProcessingError::from)
    }
}
