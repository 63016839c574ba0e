//! Plain-text form of [`PreprocessRecord`].

use crate::models::PreprocessRecord;

use super::lines::{header_line, join_trimmed, labelled_value, SectionScan};
use super::{RecordKind, ValidationError};

pub const LANGUAGE_LABEL: &str = "LANGUAGE";
pub const SUMMARY_HEADER: &str = "KEY REQUIREMENTS SUMMARY";
pub const CLEANED_HEADER: &str = "CLEANED TEXT (Main Content)";
pub const REMOVED_HEADER: &str = "REMOVED TEXT (Out of Scope)";
pub const COMPARISON_HEADER: &str = "COMPARISON VALIDATION";

const HEADERS: &[&str] = &[
    SUMMARY_HEADER,
    CLEANED_HEADER,
    REMOVED_HEADER,
    COMPARISON_HEADER,
];

/// Render a preprocess record for review. Every section is always present;
/// empty fields become empty bodies.
pub fn serialize_preprocess(record: &PreprocessRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("{LANGUAGE_LABEL}: {}\n\n", record.language.trim()));

    push_section(&mut out, SUMMARY_HEADER, &record.key_requirements_summary);
    push_section(&mut out, CLEANED_HEADER, &record.cleaned_text);
    push_section(&mut out, REMOVED_HEADER, &record.removed_text);

    out.push_str(&header_line(COMPARISON_HEADER));
    out.push('\n');
    out.push_str(&format!(
        "Agreement: {}\n",
        if record.comparison_agreement { "Yes" } else { "No" }
    ));
    let notes = record.comparison_notes.trim();
    if !notes.is_empty() {
        out.push_str(&format!("Notes: {notes}\n"));
    }
    out
}

fn push_section(out: &mut String, header: &str, body: &str) {
    out.push_str(&header_line(header));
    out.push('\n');
    let body = body.trim();
    if !body.is_empty() {
        out.push_str(body);
        out.push('\n');
    }
    out.push('\n');
}

/// Parse an edited preprocess text back into a record.
///
/// Sections may appear in any order. Only the cleaned-text section is
/// required; the others default when missing.
pub fn parse_preprocess(text: &str) -> Result<PreprocessRecord, ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::EmptyInput {
            record: RecordKind::Preprocess,
        });
    }

    let scan = SectionScan::new(text, HEADERS);

    let cleaned_text = scan
        .body(CLEANED_HEADER)
        .ok_or(ValidationError::MissingSection {
            section: CLEANED_HEADER,
        })?;
    if cleaned_text.is_empty() {
        return Err(ValidationError::EmptySection {
            section: CLEANED_HEADER,
        });
    }

    let language = scan
        .preamble()
        .iter()
        .find_map(|line| labelled_value(line, LANGUAGE_LABEL))
        .unwrap_or_default()
        .to_string();

    let (comparison_agreement, comparison_notes) = scan
        .section(COMPARISON_HEADER)
        .map(parse_comparison)
        .unwrap_or((true, String::new()));

    Ok(PreprocessRecord {
        language,
        cleaned_text,
        removed_text: scan.body(REMOVED_HEADER).unwrap_or_default(),
        key_requirements_summary: scan.body(SUMMARY_HEADER).unwrap_or_default(),
        comparison_agreement,
        comparison_notes,
    })
}

/// `Agreement:` defaults to true when absent or unreadable. `Notes:` runs to
/// the end of the section, or up to a later `Agreement:` line.
fn parse_comparison(lines: &[&str]) -> (bool, String) {
    let agreement_at = lines
        .iter()
        .position(|line| labelled_value(line, "agreement").is_some());
    let agreement = agreement_at
        .and_then(|idx| labelled_value(lines[idx], "agreement"))
        .and_then(parse_yes_no)
        .unwrap_or(true);

    let notes = lines
        .iter()
        .position(|line| labelled_value(line, "notes").is_some())
        .map(|idx| {
            let end = match agreement_at {
                Some(a) if a > idx => a,
                _ => lines.len(),
            };
            let first = labelled_value(lines[idx], "notes").unwrap_or_default();
            let mut parts = vec![first];
            parts.extend_from_slice(&lines[idx + 1..end]);
            join_trimmed(&parts)
        })
        .unwrap_or_default();

    (agreement, notes)
}

fn parse_yes_no(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" => Some(true),
        "no" | "n" | "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PreprocessRecord {
        PreprocessRecord {
            language: "en".into(),
            cleaned_text: "We are seeking proposals for a Business Process Management solution.\n\nThe platform must support workflow automation.".into(),
            removed_text: "Contact: admin@example.com".into(),
            key_requirements_summary: "- BPM solution\n- Workflow automation".into(),
            comparison_agreement: false,
            comparison_notes: "Removed contact information\nKept annex B".into(),
        }
    }

    #[test]
    fn round_trip_reproduces_every_field() {
        let record = sample();
        let parsed = parse_preprocess(&serialize_preprocess(&record)).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn round_trip_with_defaults() {
        let record = PreprocessRecord::from_cleaned_text("Only the essentials.");
        let text = serialize_preprocess(&record);
        assert!(text.contains("=== REMOVED TEXT (Out of Scope) ==="));
        assert!(text.contains("Agreement: Yes"));
        assert!(!text.contains("Notes:"));
        assert_eq!(parse_preprocess(&text).unwrap(), record);
    }

    #[test]
    fn serialize_uses_fixed_section_order() {
        let text = serialize_preprocess(&sample());
        let positions: Vec<usize> = [
            "LANGUAGE: en",
            "=== KEY REQUIREMENTS SUMMARY ===",
            "=== CLEANED TEXT (Main Content) ===",
            "=== REMOVED TEXT (Out of Scope) ===",
            "=== COMPARISON VALIDATION ===",
            "Agreement: No",
            "Notes: Removed contact information",
        ]
        .iter()
        .map(|needle| text.find(needle).expect(needle))
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn empty_input_fails() {
        assert_eq!(
            parse_preprocess("").unwrap_err(),
            ValidationError::EmptyInput {
                record: RecordKind::Preprocess
            }
        );
        assert!(parse_preprocess("  \n\t ").is_err());
    }

    #[test]
    fn missing_cleaned_text_fails() {
        let text = "LANGUAGE: en\n\n=== KEY REQUIREMENTS SUMMARY ===\n- one\n";
        assert_eq!(
            parse_preprocess(text).unwrap_err(),
            ValidationError::MissingSection {
                section: CLEANED_HEADER
            }
        );
    }

    #[test]
    fn empty_cleaned_text_fails() {
        let text = "=== CLEANED TEXT (Main Content) ===\n\n\n=== REMOVED TEXT (Out of Scope) ===\nx";
        assert_eq!(
            parse_preprocess(text).unwrap_err(),
            ValidationError::EmptySection {
                section: CLEANED_HEADER
            }
        );
    }

    #[test]
    fn reordered_sections_and_header_drift_are_tolerated() {
        let text = "language: fr\n\
                    == comparison validation ==\n\
                    Notes: reordered by hand\n\
                    agreement: NO\n\
                    ==== Cleaned Text (Main Content) ====\n\
                    Le texte principal.\n\
                    === KEY REQUIREMENTS SUMMARY ===\n\
                    - point\n";
        let record = parse_preprocess(text).unwrap();
        assert_eq!(record.language, "fr");
        assert_eq!(record.cleaned_text, "Le texte principal.");
        assert_eq!(record.key_requirements_summary, "- point");
        assert_eq!(record.removed_text, "");
        assert!(!record.comparison_agreement);
        assert_eq!(record.comparison_notes, "reordered by hand");
    }

    #[test]
    fn unparseable_agreement_defaults_to_true() {
        let text = "=== CLEANED TEXT (Main Content) ===\nBody\n=== COMPARISON VALIDATION ===\nAgreement: maybe\n";
        let record = parse_preprocess(text).unwrap();
        assert!(record.comparison_agreement);
        assert_eq!(record.comparison_notes, "");
    }

    #[test]
    fn absent_comparison_section_defaults() {
        let record = parse_preprocess("=== CLEANED TEXT (Main Content) ===\nBody").unwrap();
        assert!(record.comparison_agreement);
        assert_eq!(record.language, "");
    }
}
