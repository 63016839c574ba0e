//! Mixed-content segmenter: splits a generated response body into prose and
//! diagram-definition segments.
//!
//! Fenced ```` ```mermaid ```` blocks are the primary form. Only when a body
//! has none does the line scanner look for bare diagram definitions that
//! start with a known diagram keyword.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// One contiguous unit of a response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentSegment {
    Text {
        content: String,
    },
    Diagram {
        content: String,
        caption: Option<String>,
    },
}

impl ContentSegment {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn diagram(content: impl Into<String>, caption: Option<String>) -> Self {
        Self::Diagram {
            content: content.into(),
            caption,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Text { content } | Self::Diagram { content, .. } => content,
        }
    }

    pub fn is_diagram(&self) -> bool {
        matches!(self, Self::Diagram { .. })
    }
}

/// Words that open a bare diagram definition.
pub const DIAGRAM_KEYWORDS: &[&str] = &[
    "graph",
    "flowchart",
    "sequenceDiagram",
    "classDiagram",
    "stateDiagram",
    "stateDiagram-v2",
    "erDiagram",
    "gantt",
    "pie",
    "journey",
    "gitGraph",
    "mindmap",
    "timeline",
    "quadrantChart",
    "requirementDiagram",
    "C4Context",
];

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```mermaid[ \t]*\r?\n(.*?)```").unwrap());

/// Split `body` into ordered segments.
pub fn segment_content(body: &str) -> Vec<ContentSegment> {
    if FENCED_BLOCK.is_match(body) {
        split_fenced(body)
    } else {
        split_bare(body)
    }
}

// ---------------------------------------------------------------------------
// Fenced blocks
// ---------------------------------------------------------------------------

/// Prose spans are kept verbatim so the body can be rebuilt exactly.
fn split_fenced(body: &str) -> Vec<ContentSegment> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for caps in FENCED_BLOCK.captures_iter(body) {
        let Some(whole) = caps.get(0) else { continue };
        let prose = &body[cursor..whole.start()];
        if !prose.is_empty() {
            segments.push(ContentSegment::text(prose));
        }
        let inner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        segments.push(ContentSegment::diagram(inner.trim(), None));
        cursor = whole.end();
    }

    let tail = &body[cursor..];
    if !tail.is_empty() {
        segments.push(ContentSegment::text(tail));
    }
    segments
}

// ---------------------------------------------------------------------------
// Bare diagram definitions
// ---------------------------------------------------------------------------

fn starts_diagram(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|word| DIAGRAM_KEYWORDS.contains(&word))
}

fn caption_of(line: &str) -> Option<&str> {
    let (key, value) = line.trim().split_once(':')?;
    key.trim().eq_ignore_ascii_case("caption").then(|| value.trim())
}

fn flush_prose(segments: &mut Vec<ContentSegment>, prose: &mut Vec<&str>) {
    let text = prose.join("\n");
    prose.clear();
    let text = text.trim();
    if !text.is_empty() {
        segments.push(ContentSegment::text(text));
    }
}

fn split_bare(body: &str) -> Vec<ContentSegment> {
    let lines: Vec<&str> = body.lines().collect();
    let mut segments = Vec::new();
    let mut prose: Vec<&str> = Vec::new();
    let mut idx = 0;

    while idx < lines.len() {
        if !starts_diagram(lines[idx]) {
            prose.push(lines[idx]);
            idx += 1;
            continue;
        }

        flush_prose(&mut segments, &mut prose);

        // The block runs to a blank line; a caption line closes it early.
        let start = idx;
        let mut end = idx;
        let mut caption = None;
        while idx < lines.len() && !lines[idx].trim().is_empty() {
            if let Some(text) = caption_of(lines[idx]) {
                caption = Some(text.to_string()).filter(|c| !c.is_empty());
                idx += 1;
                break;
            }
            idx += 1;
            end = idx;
        }

        let block = dedent(&lines[start..end]);
        tracing::debug!(
            lines = end - start,
            has_caption = caption.is_some(),
            "Bare diagram block found"
        );
        segments.push(ContentSegment::diagram(block.trim(), caption));
    }

    flush_prose(&mut segments, &mut prose);
    segments
}

/// Strip the common leading whitespace of the non-blank lines.
fn dedent(lines: &[&str]) -> String {
    let indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    if indent == 0 {
        return lines.join("\n");
    }

    lines
        .iter()
        .map(|line| {
            let strip = indent.min(line.len() - line.trim_start().len());
            &line[strip..]
        })
        .collect::<Vec<_>>()
        .join("\n")
}
