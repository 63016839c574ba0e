//! Scripted in-memory backend for session tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

use serde_json::{json, Value};

use crate::edit_memory::{EditMemoryPayload, StageSnapshot};
use crate::models::{
    BuildQuery, OcrArtifact, PreprocessRecord, RequirementItem, RequirementSet, ResponseArtifact,
    StageId, StructureDetection,
};

use super::collaborators::{
    MemoryStore, PreprocessOptions, Preprocessor, QueryBuilder, RequirementsExtractor,
    ResponseGenerator, SessionStore, TextExtractor, UploadFile,
};
use super::CollaboratorError;

pub const MOCK_RESPONSE: &str = "The sky is blue. Water is wet.";

pub struct MockBackend {
    ocr_text: String,
    failing: Mutex<HashSet<StageId>>,
    memory_down: AtomicBool,
    extract_gate: Mutex<Option<Receiver<()>>>,
    edit_gate: Mutex<Option<Receiver<()>>>,
    pub calls: Mutex<Vec<String>>,
    pub edits: Mutex<Vec<EditMemoryPayload>>,
    pub snapshots: Mutex<Vec<StageSnapshot>>,
}

impl MockBackend {
    pub fn new(ocr_text: &str) -> Self {
        Self {
            ocr_text: ocr_text.to_string(),
            failing: Mutex::new(HashSet::new()),
            memory_down: AtomicBool::new(false),
            extract_gate: Mutex::new(None),
            edit_gate: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            snapshots: Mutex::new(Vec::new()),
        }
    }

    /// Make the stage's collaborator fail until `recover` is called.
    pub fn fail(&self, stage: StageId) {
        self.failing.lock().unwrap().insert(stage);
    }

    pub fn recover(&self, stage: StageId) {
        self.failing.lock().unwrap().remove(&stage);
    }

    pub fn memory_down(&self) {
        self.memory_down.store(true, Ordering::SeqCst);
    }

    /// Hold the next extraction until the returned sender fires.
    pub fn hold_extraction(&self) -> Sender<()> {
        let (tx, rx) = channel();
        *self.extract_gate.lock().unwrap() = Some(rx);
        tx
    }

    /// Hold the next `store_edit` after it is logged, until the returned
    /// sender fires.
    pub fn hold_memory_edit(&self) -> Sender<()> {
        let (tx, rx) = channel();
        *self.edit_gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == name).count()
    }

    fn record(&self, stage: Option<StageId>, name: &str) -> Result<(), CollaboratorError> {
        self.calls.lock().unwrap().push(name.to_string());
        match stage {
            Some(stage) if self.failing.lock().unwrap().contains(&stage) => {
                Err(CollaboratorError::Backend {
                    status: 503,
                    body: format!("{stage} unavailable"),
                })
            }
            _ => Ok(()),
        }
    }
}

impl TextExtractor for MockBackend {
    fn extract(&self, files: &[UploadFile]) -> Result<OcrArtifact, CollaboratorError> {
        let gate = self.extract_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        self.record(Some(StageId::Ocr), "extract")?;
        Ok(OcrArtifact {
            extracted_text: self.ocr_text.clone(),
            language: if files.is_empty() { String::new() } else { "en".into() },
        })
    }
}

impl Preprocessor for MockBackend {
    fn preprocess(
        &self,
        raw_text: &str,
        options: &PreprocessOptions,
    ) -> Result<PreprocessRecord, CollaboratorError> {
        self.record(Some(StageId::Preprocess), "preprocess")?;
        Ok(PreprocessRecord {
            language: options.language_hint.clone().unwrap_or_else(|| "en".into()),
            cleaned_text: raw_text.trim().to_string(),
            removed_text: "Contact: procurement@example.com".into(),
            key_requirements_summary: "- Workflow automation".into(),
            comparison_agreement: true,
            comparison_notes: String::new(),
        })
    }
}

impl RequirementsExtractor for MockBackend {
    fn extract_requirements(
        &self,
        preprocess: &PreprocessRecord,
        detect_structure: bool,
    ) -> Result<RequirementSet, CollaboratorError> {
        self.record(Some(StageId::Requirements), "requirements")?;
        Ok(RequirementSet {
            solution_requirements: vec![RequirementItem::new(
                "SOL-001",
                "Technical",
                preprocess.cleaned_text.clone(),
            )],
            response_structure_requirements: vec![RequirementItem::new(
                "RESP-001",
                "Structure",
                "Provide an executive summary.",
            )],
            notes: String::new(),
            structure_detection: detect_structure.then(|| StructureDetection {
                has_explicit_structure: true,
                structure_type: "explicit".into(),
                confidence: 0.8,
                detected_sections: vec!["Executive Summary".into()],
                structure_description: String::new(),
            }),
        })
    }
}

impl QueryBuilder for MockBackend {
    fn build_query(
        &self,
        preprocess: &PreprocessRecord,
        requirements: &RequirementSet,
    ) -> Result<BuildQuery, CollaboratorError> {
        self.record(Some(StageId::BuildQuery), "build_query")?;
        Ok(BuildQuery {
            query_text: format!("Respond to: {}", preprocess.cleaned_text),
            solution_requirements_summary: format!(
                "{} solution requirements",
                requirements.solution_requirements.len()
            ),
            ..Default::default()
        })
    }
}

impl ResponseGenerator for MockBackend {
    fn generate(
        &self,
        _preprocess: &PreprocessRecord,
        _requirements: &RequirementSet,
        query: &BuildQuery,
    ) -> Result<ResponseArtifact, CollaboratorError> {
        self.record(Some(StageId::Response), "generate")?;
        Ok(ResponseArtifact(json!({
            "response_text": MOCK_RESPONSE,
            "query_confirmed": query.confirmed,
        })))
    }
}

impl MemoryStore for MockBackend {
    fn store_edit(&self, payload: &EditMemoryPayload) -> Result<(), CollaboratorError> {
        self.record(None, "store_edit")?;
        let gate = self.edit_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        if self.memory_down.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Connection("memory".into()));
        }
        self.edits.lock().unwrap().push(payload.clone());
        Ok(())
    }

    fn store_snapshot(&self, snapshot: &StageSnapshot) -> Result<(), CollaboratorError> {
        self.record(None, "store_snapshot")?;
        if self.memory_down.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Connection("memory".into()));
        }
        self.snapshots.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}

impl SessionStore for MockBackend {
    fn fetch_session(&self, session_id: &str) -> Result<Option<Value>, CollaboratorError> {
        self.record(None, "fetch_session")?;
        Ok((session_id == "s-1").then(|| json!({"session_id": session_id, "messages": []})))
    }

    fn fetch_preview(&self, session_id: &str) -> Result<Option<Value>, CollaboratorError> {
        self.record(None, "fetch_preview")?;
        Ok((session_id == "s-1").then(|| json!({"session_id": session_id, "preview": "..."})))
    }
}
