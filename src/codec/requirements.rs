//! Plain-text form of [`RequirementSet`].
//!
//! Each requirement renders as a block:
//!
//! ```text
//! [1] ID: SOL-001
//! Category: Technical
//! Text:
//! The solution must support workflow automation.
//! ----------------------------------------
//! ```
//!
//! On parse, blocks split at separator lines and at `[n]` index markers, so a
//! deleted separator does not merge two requirements.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{
    RequirementItem, RequirementKind, RequirementSet, StructureDetection, DEFAULT_CATEGORY,
};

use super::lines::{header_line, join_trimmed, labelled_value, SectionScan};
use super::{RecordKind, ValidationError};

pub const NOTES_HEADER: &str = "NOTES";
pub const SOLUTION_HEADER: &str = "SOLUTION REQUIREMENTS";
pub const STRUCTURE_HEADER: &str = "RESPONSE STRUCTURE REQUIREMENTS";
pub const DETECTION_HEADER: &str = "STRUCTURE DETECTION (read-only)";

pub const SEPARATOR: &str = "----------------------------------------";
pub const NO_SOLUTION_PLACEHOLDER: &str = "(No solution requirements)";
pub const NO_STRUCTURE_PLACEHOLDER: &str = "(No response structure requirements)";

/// Shortest dash run accepted as a separator after hand edits.
const MIN_SEPARATOR_LEN: usize = 10;

const HEADERS: &[&str] = &[
    NOTES_HEADER,
    SOLUTION_HEADER,
    STRUCTURE_HEADER,
    DETECTION_HEADER,
];

static INDEX_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\[(\d+)\]\s*(?:ID\s*:\s*(.*))?$").unwrap());

fn section_header(kind: RequirementKind) -> &'static str {
    match kind {
        RequirementKind::Solution => SOLUTION_HEADER,
        RequirementKind::ResponseStructure => STRUCTURE_HEADER,
    }
}

fn placeholder(kind: RequirementKind) -> &'static str {
    match kind {
        RequirementKind::Solution => NO_SOLUTION_PLACEHOLDER,
        RequirementKind::ResponseStructure => NO_STRUCTURE_PLACEHOLDER,
    }
}

// ---------------------------------------------------------------------------
// Serialize
// ---------------------------------------------------------------------------

/// Render a requirement set for review.
pub fn serialize_requirements(set: &RequirementSet) -> String {
    let mut out = String::new();

    let notes = set.notes.trim();
    if !notes.is_empty() {
        out.push_str(&header_line(NOTES_HEADER));
        out.push('\n');
        out.push_str(notes);
        out.push_str("\n\n");
    }

    push_items(&mut out, RequirementKind::Solution, &set.solution_requirements);
    push_items(
        &mut out,
        RequirementKind::ResponseStructure,
        &set.response_structure_requirements,
    );

    if let Some(detection) = &set.structure_detection {
        push_detection(&mut out, detection);
    }
    out
}

fn push_items(out: &mut String, kind: RequirementKind, items: &[RequirementItem]) {
    out.push_str(&header_line(section_header(kind)));
    out.push('\n');

    if items.is_empty() {
        out.push_str(placeholder(kind));
        out.push('\n');
    }

    for (idx, item) in items.iter().enumerate() {
        let position = idx + 1;
        let id = match item.id.trim() {
            "" => kind.auto_id(position),
            id => id.to_string(),
        };
        let category = match item.category.trim() {
            "" => DEFAULT_CATEGORY,
            category => category,
        };
        out.push_str(&format!("[{position}] ID: {id}\n"));
        out.push_str(&format!("Category: {category}\n"));
        out.push_str("Text:\n");
        out.push_str(item.source_text.trim());
        out.push('\n');
        out.push_str(SEPARATOR);
        out.push('\n');
    }
    out.push('\n');
}

fn push_detection(out: &mut String, detection: &StructureDetection) {
    out.push_str(&header_line(DETECTION_HEADER));
    out.push('\n');
    out.push_str(&format!(
        "Explicit structure: {}\n",
        if detection.has_explicit_structure { "Yes" } else { "No" }
    ));
    out.push_str(&format!("Structure type: {}\n", detection.structure_type));
    out.push_str(&format!(
        "Confidence: {}%\n",
        (detection.confidence * 100.0).round() as i64
    ));
    out.push_str(&format!(
        "Detected sections: {}\n",
        detection.detected_sections.join(", ")
    ));
    let description = detection.structure_description.trim();
    if !description.is_empty() {
        out.push_str(&format!("Description: {description}\n"));
    }
}

// ---------------------------------------------------------------------------
// Parse
// ---------------------------------------------------------------------------

/// Parse an edited requirements text back into a requirement set.
///
/// `prior_detection` is carried into the result untouched; the read-only
/// detection section in the text is ignored.
pub fn parse_requirements(
    text: &str,
    prior_detection: Option<&StructureDetection>,
) -> Result<RequirementSet, ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::EmptyInput {
            record: RecordKind::Requirements,
        });
    }

    let scan = SectionScan::new(text, HEADERS);
    if !scan.has_section(SOLUTION_HEADER) && !scan.has_section(STRUCTURE_HEADER) {
        return Err(ValidationError::MissingSection {
            section: SOLUTION_HEADER,
        });
    }

    let items_of = |kind: RequirementKind| {
        scan.section(section_header(kind))
            .map(|lines| parse_items(lines, kind))
            .unwrap_or_default()
    };

    Ok(RequirementSet {
        solution_requirements: items_of(RequirementKind::Solution),
        response_structure_requirements: items_of(RequirementKind::ResponseStructure),
        notes: scan.body(NOTES_HEADER).unwrap_or_default(),
        structure_detection: prior_detection.cloned(),
    })
}

fn parse_items(lines: &[&str], kind: RequirementKind) -> Vec<RequirementItem> {
    let mut items: Vec<RequirementItem> = Vec::new();
    for block in split_blocks(lines) {
        if let Some(item) = parse_block(&block, kind, items.len() + 1) {
            items.push(item);
        }
    }
    items
}

fn is_separator(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= MIN_SEPARATOR_LEN && trimmed.chars().all(|c| c == '-')
}

/// `Some(id)` for an index-marker line; the inner option is the id after
/// `ID:` when present and non-empty.
fn index_marker(line: &str) -> Option<Option<String>> {
    let caps = INDEX_MARKER.captures(line.trim())?;
    Some(
        caps.get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|id| !id.is_empty()),
    )
}

fn is_placeholder(line: &str) -> bool {
    let bare = line.trim().trim_start_matches('(').trim_end_matches(')').trim();
    [NO_SOLUTION_PLACEHOLDER, NO_STRUCTURE_PLACEHOLDER]
        .iter()
        .any(|p| p.trim_start_matches('(').trim_end_matches(')').eq_ignore_ascii_case(bare))
}

fn split_blocks<'a>(lines: &[&'a str]) -> Vec<Vec<&'a str>> {
    let mut blocks: Vec<Vec<&'a str>> = Vec::new();
    let mut current: Vec<&'a str> = Vec::new();

    for &line in lines {
        if is_separator(line) {
            blocks.push(std::mem::take(&mut current));
        } else if index_marker(line).is_some() {
            blocks.push(std::mem::take(&mut current));
            current.push(line);
        } else {
            current.push(line);
        }
    }
    blocks.push(current);
    blocks.retain(|block| block.iter().any(|line| !line.trim().is_empty()));
    blocks
}

/// Metadata lines are read only before `Text:`; after it every line is body.
fn parse_block(block: &[&str], kind: RequirementKind, position: usize) -> Option<RequirementItem> {
    let mut id: Option<String> = None;
    let mut category: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();
    let mut in_body = false;

    for &line in block {
        if in_body {
            body.push(line);
            continue;
        }
        if let Some(marker_id) = index_marker(line) {
            if id.is_none() {
                id = marker_id;
            }
            continue;
        }
        if is_placeholder(line) {
            continue;
        }
        if let Some(value) = labelled_value(line, "id") {
            if id.is_none() && !value.is_empty() {
                id = Some(value.to_string());
            }
            continue;
        }
        if let Some(value) = labelled_value(line, "category") {
            if category.is_none() && !value.is_empty() {
                category = Some(value.to_string());
            }
            continue;
        }
        if let Some(value) = labelled_value(line, "text") {
            in_body = true;
            if !value.is_empty() {
                body.push(value);
            }
            continue;
        }
        // No `Text:` marker yet: loose lines still count as body.
        body.push(line);
    }

    let source_text = join_trimmed(&body);
    if source_text.is_empty() {
        return None;
    }

    Some(RequirementItem {
        id: id.unwrap_or_else(|| kind.auto_id(position)),
        category: category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        source_text,
    })
}
