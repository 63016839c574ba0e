use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::enums::StageId;
use super::preprocess::PreprocessRecord;
use super::requirements::RequirementSet;

/// Text pulled out of the uploaded files by the extraction collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrArtifact {
    pub extracted_text: String,
    #[serde(default)]
    pub language: String,
}

/// Query assembled from the confirmed preprocess and requirements output.
///
/// Fields the crate does not know about are kept in `extra` so the payload
/// goes back to the backend exactly as it came.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BuildQuery {
    #[serde(default)]
    pub query_text: String,
    #[serde(default)]
    pub solution_requirements_summary: String,
    #[serde(default)]
    pub response_structure_requirements_summary: String,
    #[serde(default)]
    pub extraction_data: Value,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Generated response, kept as the backend returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseArtifact(pub Value);

impl ResponseArtifact {
    /// Body text shown to the user.
    ///
    /// Single responses carry `response_text`; per-requirement responses
    /// carry a `responses` list whose bodies are joined by blank lines.
    pub fn body(&self) -> String {
        match &self.0 {
            Value::String(text) => text.clone(),
            Value::Object(map) => {
                if let Some(Value::String(text)) = map.get("response_text") {
                    return text.clone();
                }
                match map.get("responses") {
                    Some(Value::Array(items)) => items
                        .iter()
                        .filter_map(|item| item.get("response_text").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                        .join("\n\n"),
                    _ => String::new(),
                }
            }
            _ => String::new(),
        }
    }

    /// Replace the body after a human edit, keeping every other field.
    pub fn set_body(&mut self, body: &str) {
        match &mut self.0 {
            Value::Object(map) => {
                map.insert("response_text".into(), Value::String(body.to_string()));
            }
            other => *other = Value::String(body.to_string()),
        }
    }
}

/// The artifact a stage produced. The variant decides the owning stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "data", rename_all = "kebab-case")]
pub enum StageArtifact {
    Ocr(OcrArtifact),
    Preprocess(PreprocessRecord),
    Requirements(RequirementSet),
    BuildQuery(BuildQuery),
    Response(ResponseArtifact),
}

impl StageArtifact {
    pub fn stage(&self) -> StageId {
        match self {
            Self::Ocr(_) => StageId::Ocr,
            Self::Preprocess(_) => StageId::Preprocess,
            Self::Requirements(_) => StageId::Requirements,
            Self::BuildQuery(_) => StageId::BuildQuery,
            Self::Response(_) => StageId::Response,
        }
    }
}
