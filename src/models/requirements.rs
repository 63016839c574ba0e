use serde::{Deserialize, Serialize};

/// Category used when a requirement has none.
pub const DEFAULT_CATEGORY: &str = "General";

/// A single requirement quoted from the RFP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementItem {
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub source_text: String,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl RequirementItem {
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        source_text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            source_text: source_text.into(),
        }
    }
}

/// Which of the two requirement lists an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementKind {
    Solution,
    ResponseStructure,
}

impl RequirementKind {
    /// Prefix for generated ids (`SOL-1`, `STRUCT-1`).
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Solution => "SOL",
            Self::ResponseStructure => "STRUCT",
        }
    }

    /// Id assigned to the item at 1-based `position` when it has none.
    pub fn auto_id(&self, position: usize) -> String {
        format!("{}-{}", self.id_prefix(), position)
    }
}

/// Output of the requirements stage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequirementSet {
    #[serde(default)]
    pub solution_requirements: Vec<RequirementItem>,
    #[serde(default)]
    pub response_structure_requirements: Vec<RequirementItem>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub structure_detection: Option<StructureDetection>,
}

impl RequirementSet {
    pub fn items(&self, kind: RequirementKind) -> &[RequirementItem] {
        match kind {
            RequirementKind::Solution => &self.solution_requirements,
            RequirementKind::ResponseStructure => &self.response_structure_requirements,
        }
    }

    pub fn total_items(&self) -> usize {
        self.solution_requirements.len() + self.response_structure_requirements.len()
    }
}

/// Read-only analysis of whether the RFP mandates a response outline.
///
/// Never produced by the text parser. Carried forward unchanged when a
/// requirement set is re-parsed after a human edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureDetection {
    pub has_explicit_structure: bool,
    #[serde(default)]
    pub structure_type: String,
    /// Not clamped: out-of-range values from the backend pass through.
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub detected_sections: Vec<String>,
    #[serde(default)]
    pub structure_description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_ids_use_kind_prefix() {
        assert_eq!(RequirementKind::Solution.auto_id(3), "SOL-3");
        assert_eq!(RequirementKind::ResponseStructure.auto_id(1), "STRUCT-1");
    }

    #[test]
    fn unknown_item_fields_are_ignored() {
        let item: RequirementItem = serde_json::from_str(
            r#"{"id": "SOL-001", "type": "functional", "source_text": "Must scale"}"#,
        )
        .unwrap();
        assert_eq!(item.id, "SOL-001");
        assert_eq!(item.category, DEFAULT_CATEGORY);
    }

    #[test]
    fn structure_detection_confidence_is_not_clamped() {
        let detection: StructureDetection = serde_json::from_str(
            r#"{"has_explicit_structure": true, "structure_type": "explicit", "confidence": 1.5}"#,
        )
        .unwrap();
        assert!((detection.confidence - 1.5).abs() < f64::EPSILON);
        assert!(detection.detected_sections.is_empty());
    }

    #[test]
    fn total_items_counts_both_lists() {
        let set = RequirementSet {
            solution_requirements: vec![RequirementItem::new("SOL-1", "Tech", "A")],
            response_structure_requirements: vec![
                RequirementItem::new("STRUCT-1", "Format", "B"),
                RequirementItem::new("STRUCT-2", "Format", "C"),
            ],
            ..Default::default()
        };
        assert_eq!(set.total_items(), 3);
        assert_eq!(set.items(RequirementKind::ResponseStructure).len(), 2);
    }
}
