//! Stage snapshots forwarded to the memory store after a stage is confirmed.
//!
//! Snapshots are keyed by a SHA-256 of the text the stage worked from, so
//! repeated runs over the same RFP land under the same memory user.

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::config::APP_NAME;
use crate::models::enums::str_enum;
use crate::models::{BuildQuery, PreprocessRecord, RequirementItem, RequirementSet};

pub const CLEANED_EXCERPT_CHARS: usize = 4000;
pub const MAX_SNAPSHOT_REQUIREMENTS: usize = 100;
pub const REQUIREMENT_TEXT_CHARS: usize = 2000;
pub const QUERY_SUMMARY_CHARS: usize = 4000;
pub const QUERY_PREVIEW_CHARS: usize = 8000;

str_enum!(
    /// Stage a memory snapshot was taken after.
    SnapshotStage {
        Preprocess => "preprocess",
        Requirements => "requirements",
        BuildQuery => "build_query",
    }
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub stage: SnapshotStage,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMessage {
    pub role: String,
    pub content: String,
}

impl MemoryMessage {
    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// A summary of one stage's output, as stored in long-term memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub user_id: String,
    pub metadata: SnapshotMetadata,
    pub messages: Vec<MemoryMessage>,
}

impl StageSnapshot {
    pub fn stage(&self) -> SnapshotStage {
        self.metadata.stage
    }
}

/// Lowercase hex SHA-256 of the text.
pub fn source_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn snapshot(
    source_text: &str,
    stage: SnapshotStage,
    language: Option<String>,
    messages: Vec<MemoryMessage>,
) -> Option<StageSnapshot> {
    if source_text.is_empty() {
        tracing::debug!(stage = %stage, "No source text, skipping memory snapshot");
        return None;
    }
    Some(StageSnapshot {
        user_id: source_hash(source_text),
        metadata: SnapshotMetadata {
            stage,
            source: APP_NAME.to_string(),
            language,
        },
        messages,
    })
}

/// Snapshot of a confirmed preprocess record, keyed by the extracted text.
pub fn preprocess_snapshot(source_text: &str, record: &PreprocessRecord) -> Option<StageSnapshot> {
    let summary = match record.key_requirements_summary.trim() {
        "" => "RFP preprocess summary",
        summary => summary,
    };
    let body = json!({
        "key_requirements_summary": summary,
        "language": record.language,
        "removed_text_length": record.removed_text.chars().count(),
        "cleaned_text_excerpt": truncate_chars(&record.cleaned_text, CLEANED_EXCERPT_CHARS),
    });

    let language = Some(record.language.clone()).filter(|l| !l.is_empty());
    snapshot(
        source_text,
        SnapshotStage::Preprocess,
        language,
        vec![
            MemoryMessage::user(summary),
            MemoryMessage::assistant(body.to_string()),
        ],
    )
}

fn simplify(items: &[RequirementItem]) -> Vec<serde_json::Value> {
    items
        .iter()
        .take(MAX_SNAPSHOT_REQUIREMENTS)
        .map(|item| {
            json!({
                "id": item.id,
                "category": item.category,
                "source_text": truncate_chars(&item.source_text, REQUIREMENT_TEXT_CHARS),
            })
        })
        .collect()
}

/// Snapshot of a requirement set, keyed by the cleaned text it came from.
pub fn requirements_snapshot(source_text: &str, set: &RequirementSet) -> Option<StageSnapshot> {
    let body = json!({
        "summary": "RFP requirements snapshot",
        "solution_requirements_count": set.solution_requirements.len(),
        "response_structure_requirements_count": set.response_structure_requirements.len(),
        "solution_requirements": simplify(&set.solution_requirements),
        "response_structure_requirements": simplify(&set.response_structure_requirements),
        "notes": set.notes,
    });
    snapshot(
        source_text,
        SnapshotStage::Requirements,
        None,
        vec![
            MemoryMessage::user("RFP REQUIREMENTS SNAPSHOT"),
            MemoryMessage::assistant(body.to_string()),
        ],
    )
}

/// Snapshot of a confirmed build query, keyed by the cleaned text.
pub fn build_query_snapshot(source_text: &str, query: &BuildQuery) -> Option<StageSnapshot> {
    let body = json!({
        "summary": "RFP build query snapshot",
        "solution_requirements_summary":
            truncate_chars(&query.solution_requirements_summary, QUERY_SUMMARY_CHARS),
        "response_structure_requirements_summary":
            truncate_chars(&query.response_structure_requirements_summary, QUERY_SUMMARY_CHARS),
        "query_preview": truncate_chars(&query.query_text, QUERY_PREVIEW_CHARS),
    });
    snapshot(
        source_text,
        SnapshotStage::BuildQuery,
        None,
        vec![
            MemoryMessage::user("RFP BUILD QUERY SNAPSHOT"),
            MemoryMessage::assistant(body.to_string()),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn assistant_json(snapshot: &StageSnapshot) -> Value {
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.messages[0].role, "user");
        assert_eq!(snapshot.messages[1].role, "assistant");
        serde_json::from_str(&snapshot.messages[1].content).unwrap()
    }

    #[test]
    fn source_hash_is_sha256_hex() {
        assert_eq!(
            source_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(source_hash("abc").len(), 64);
    }

    #[test]
    fn empty_source_text_skips_snapshot() {
        let record = PreprocessRecord::from_cleaned_text("body");
        assert!(preprocess_snapshot("", &record).is_none());
        assert!(requirements_snapshot("", &RequirementSet::default()).is_none());
        assert!(build_query_snapshot("", &BuildQuery::default()).is_none());
    }

    #[test]
    fn preprocess_snapshot_truncates_excerpt() {
        let mut record = PreprocessRecord::from_cleaned_text("é".repeat(5000));
        record.language = "fr".into();
        record.removed_text = "xyz".into();
        let snap = preprocess_snapshot("raw ocr", &record).unwrap();

        assert_eq!(snap.user_id, source_hash("raw ocr"));
        assert_eq!(snap.stage(), SnapshotStage::Preprocess);
        assert_eq!(snap.metadata.source, "rfp-assistant");
        assert_eq!(snap.metadata.language.as_deref(), Some("fr"));
        assert_eq!(snap.messages[0].content, "RFP preprocess summary");

        let body = assistant_json(&snap);
        assert_eq!(body["cleaned_text_excerpt"].as_str().unwrap().chars().count(), 4000);
        assert_eq!(body["removed_text_length"], 3);
    }

    #[test]
    fn requirements_snapshot_caps_items_and_text() {
        let items: Vec<RequirementItem> = (0..120)
            .map(|i| RequirementItem::new(format!("SOL-{i}"), "General", "x".repeat(2500)))
            .collect();
        let set = RequirementSet {
            solution_requirements: items,
            ..Default::default()
        };
        let snap = requirements_snapshot("essential", &set).unwrap();
        assert!(snap.metadata.language.is_none());

        let body = assistant_json(&snap);
        assert_eq!(body["solution_requirements_count"], 120);
        let listed = body["solution_requirements"].as_array().unwrap();
        assert_eq!(listed.len(), MAX_SNAPSHOT_REQUIREMENTS);
        assert_eq!(listed[0]["source_text"].as_str().unwrap().len(), 2000);
    }

    #[test]
    fn build_query_snapshot_previews_query() {
        let query = BuildQuery {
            query_text: "q".repeat(9000),
            solution_requirements_summary: "s".repeat(10),
            ..Default::default()
        };
        let snap = build_query_snapshot("essential", &query).unwrap();
        assert_eq!(snap.stage().as_str(), "build_query");
        let body = assistant_json(&snap);
        assert_eq!(body["query_preview"].as_str().unwrap().len(), 8000);
        assert_eq!(body["solution_requirements_summary"], "ssssssssss");
    }

    #[test]
    fn snapshot_stage_parses_its_own_names() {
        for stage in [
            SnapshotStage::Preprocess,
            SnapshotStage::Requirements,
            SnapshotStage::BuildQuery,
        ] {
            assert_eq!(stage.as_str().parse::<SnapshotStage>().unwrap(), stage);
        }
        assert!("build-query".parse::<SnapshotStage>().is_err());
    }

    #[test]
    fn metadata_serializes_stage_in_snake_case() {
        let snap = build_query_snapshot("t", &BuildQuery::default()).unwrap();
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["metadata"]["stage"], "build_query");
        assert!(json["metadata"].get("language").is_none());
    }
}
