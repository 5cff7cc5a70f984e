//! Directive comment scanning
//!
//! Classifies single-line comments (`#` and `//` styles) that carry an `AI`
//! marker. Block comments are never considered.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Comment leaders recognised by the scanner, longest first
const COMMENT_LEADERS: [&str; 2] = ["//", "#"];

/// What a directive asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveKind {
    /// `AI!` - edit the file
    Modify,
    /// `AI?` - answer a question
    Question,
    /// Bare `AI` - context note for a later directive
    Note,
}

impl DirectiveKind {
    /// Whether a directive of this kind starts an agent session
    pub fn is_actionable(self) -> bool {
        matches!(self, DirectiveKind::Modify)
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectiveKind::Modify => write!(f, "modify"),
            DirectiveKind::Question => write!(f, "question"),
            DirectiveKind::Note => write!(f, "note"),
        }
    }
}

/// A classified directive located in a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trigger {
    pub file_path: PathBuf,
    /// 1-based
    pub line_number: usize,
    /// Line exactly as it appears in the file
    pub raw_line: String,
    /// Comment body with the comment leader stripped, markers kept
    pub instruction_text: String,
    pub kind: DirectiveKind,
}

impl Trigger {
    /// Check whether `content` still contains the line this trigger came from
    pub fn is_present_in(&self, content: &str) -> bool {
        content.lines().any(|line| line == self.raw_line)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} [{}] {}",
            self.file_path.display(),
            self.line_number,
            self.kind,
            self.instruction_text
        )
    }
}

/// Scan file content and return every directive in line order
pub fn scan(file_path: &Path, content: &str) -> Vec<Trigger> {
    content
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            classify_line(line).map(|(kind, instruction_text)| Trigger {
                file_path: file_path.to_path_buf(),
                line_number: idx + 1,
                raw_line: line.to_string(),
                instruction_text,
                kind,
            })
        })
        .collect()
}

/// Classify one line of text
///
/// Returns the directive kind and the instruction text, or `None` if the
/// line is not a directive comment.
pub fn classify_line(line: &str) -> Option<(DirectiveKind, String)> {
    let body = comment_body(line.trim())?;

    if !is_directive(body) {
        return None;
    }

    // AI! beats AI? beats bare AI, regardless of where the marker sits
    let kind = if body.contains("AI!") {
        DirectiveKind::Modify
    } else if body.contains("AI?") {
        DirectiveKind::Question
    } else {
        DirectiveKind::Note
    };

    Some((kind, body.to_string()))
}

/// Strip the comment leader and surrounding whitespace
fn comment_body(trimmed: &str) -> Option<&str> {
    COMMENT_LEADERS
        .iter()
        .find_map(|leader| trimmed.strip_prefix(leader))
        .map(str::trim)
}

/// A body is a directive when it opens with an `AI` word or closes with
/// `AI`, `AI!` or `AI?`
fn is_directive(body: &str) -> bool {
    starts_with_marker(body) || ends_with_marker(body)
}

fn starts_with_marker(body: &str) -> bool {
    match body.strip_prefix("AI") {
        Some(rest) => rest
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric() && c != '_'),
        None => false,
    }
}

fn ends_with_marker(body: &str) -> bool {
    let stem = body
        .strip_suffix('!')
        .or_else(|| body.strip_suffix('?'))
        .unwrap_or(body);

    match stem.strip_suffix("AI") {
        Some(rest) => rest
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric() && c != '_'),
        None => false,
    }
}
