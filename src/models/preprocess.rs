use serde::{Deserialize, Serialize};

/// Output of the preprocess stage: the RFP text split into in-scope and
/// out-of-scope parts, plus the model's self-check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessRecord {
    #[serde(default)]
    pub language: String,
    pub cleaned_text: String,
    #[serde(default)]
    pub removed_text: String,
    #[serde(default)]
    pub key_requirements_summary: String,
    #[serde(default = "default_agreement")]
    pub comparison_agreement: bool,
    #[serde(default)]
    pub comparison_notes: String,
}

fn default_agreement() -> bool {
    true
}

impl PreprocessRecord {
    /// Record holding only cleaned text; everything else takes its default.
    pub fn from_cleaned_text(cleaned_text: impl Into<String>) -> Self {
        Self {
            language: String::new(),
            cleaned_text: cleaned_text.into(),
            removed_text: String::new(),
            key_requirements_summary: String::new(),
            comparison_agreement: true,
            comparison_notes: String::new(),
        }
    }
}
