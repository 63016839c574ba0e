//! Async driver for one RFP document.
//!
//! The session owns the [`PipelineState`] behind a std mutex and runs every
//! collaborator call on the blocking pool. The lock is taken only for short
//! synchronous sections and never across an await. Each stage is started
//! with a ticket; a [`reset`](PipelineSession::reset) while a call is in
//! flight makes its result stale and it is dropped on arrival.

use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use crate::codec::{parse_preprocess, parse_requirements, serialize_preprocess, serialize_requirements};
use crate::edit_memory::{
    build_query_snapshot, preprocess_snapshot, requirements_snapshot, EditMemoryPayload,
    StageSnapshot,
};
use crate::models::{
    BuildQuery, Confirmation, OcrArtifact, PreprocessRecord, RequirementSet, ResponseArtifact,
    StageArtifact, StageId, StageStatus,
};
use crate::segment::{segment_content, ContentSegment};

use super::collaborators::{Collaborators, PreprocessOptions, UploadFile};
use super::state::{PipelineState, PipelineView, StageOutcome};
use super::{CollaboratorError, PipelineError};

pub struct PipelineSession {
    state: Mutex<PipelineState>,
    collaborators: Collaborators,
}

impl PipelineSession {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            state: Mutex::new(PipelineState::new()),
            collaborators,
        }
    }

    // ── State access ────────────────────────────────────────

    fn lock(&self) -> Result<MutexGuard<'_, PipelineState>, PipelineError> {
        self.state.lock().map_err(|_| PipelineError::LockPoisoned)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut PipelineState) -> R) -> Result<R, PipelineError> {
        let mut guard = self.lock()?;
        Ok(f(&mut *guard))
    }

    /// Display view of the current state.
    pub fn view(&self) -> Result<PipelineView, PipelineError> {
        self.with_state(|state| state.view())
    }

    /// Owned copy of the current state.
    pub fn state(&self) -> Result<PipelineState, PipelineError> {
        self.with_state(|state| state.clone())
    }

    /// Drop everything and invalidate in-flight calls.
    pub fn reset(&self) -> Result<(), PipelineError> {
        self.with_state(PipelineState::reset)?;
        tracing::info!("Pipeline reset");
        Ok(())
    }

    // ── Stage runner ────────────────────────────────────────

    /// Run one collaborator call as `stage`.
    ///
    /// The stage is marked processing before the call and settled after it
    /// returns. `accept` can reject a successful result, which then counts as
    /// a stage failure.
    async fn run_stage<T, F>(
        &self,
        stage: StageId,
        call: F,
        accept: impl FnOnce(&T) -> Result<(), PipelineError>,
        wrap: impl FnOnce(T) -> StageArtifact,
    ) -> Result<T, PipelineError>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<T, CollaboratorError> + Send + 'static,
    {
        let ticket = self.with_state(|state| state.begin(stage))??;
        tracing::info!(stage = %stage, generation = ticket.generation, "Stage started");

        let result = tokio::task::spawn_blocking(call).await;

        let (outcome, value) = match result {
            Ok(Ok(value)) => match accept(&value) {
                Ok(()) => (StageOutcome::Completed(wrap(value.clone())), Ok(value)),
                Err(e) => (StageOutcome::Failed(e.to_string()), Err(e)),
            },
            Ok(Err(source)) => (
                StageOutcome::Failed(source.to_string()),
                Err(PipelineError::Collaborator { stage, source }),
            ),
            Err(join) => (
                StageOutcome::Failed(join.to_string()),
                Err(PipelineError::Task(join.to_string())),
            ),
        };

        let failed = matches!(outcome, StageOutcome::Failed(_));
        self.with_state(|state| state.settle(ticket, outcome))??;

        match &value {
            Ok(_) => tracing::info!(stage = %stage, "Stage complete"),
            Err(e) if failed => tracing::warn!(stage = %stage, error = %e, "Stage failed"),
            Err(_) => {}
        }
        value
    }

    /// Forward a stage snapshot to memory. Failures are logged and dropped.
    async fn remember(&self, snapshot: Option<StageSnapshot>) {
        let Some(snapshot) = snapshot else { return };
        let memory = self.collaborators.memory.clone();
        let stage = snapshot.stage();
        let result = tokio::task::spawn_blocking(move || memory.store_snapshot(&snapshot)).await;
        match result {
            Ok(Ok(())) => tracing::debug!(stage = %stage, "Memory snapshot stored"),
            Ok(Err(e)) => tracing::warn!(stage = %stage, error = %e, "Memory snapshot failed"),
            Err(e) => tracing::warn!(stage = %stage, error = %e, "Memory snapshot task failed"),
        }
    }

    fn require<T>(
        &self,
        stage: StageId,
        get: impl FnOnce(&PipelineState) -> Option<&T>,
    ) -> Result<T, PipelineError>
    where
        T: Clone,
    {
        self.with_state(|state| get(&*state).cloned())?
            .ok_or(PipelineError::MissingArtifact { stage })
    }

    fn ensure_idle(&self, stage: StageId) -> Result<(), PipelineError> {
        let status = self.with_state(|state| state.stored_status(stage))?;
        if status == StageStatus::Processing {
            return Err(PipelineError::transition(stage, "already processing"));
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════
    // OCR
    // ═══════════════════════════════════════════════════════════

    /// Start a new document. Resets the pipeline, then extracts text.
    pub async fn upload(&self, files: Vec<UploadFile>) -> Result<OcrArtifact, PipelineError> {
        if files.is_empty() {
            return Err(PipelineError::transition(StageId::Ocr, "no files uploaded"));
        }
        if let Some(bad) = files.iter().find(|file| !file.is_supported()) {
            tracing::warn!(file = %bad.file_name, "Rejected upload with unsupported type");
            return Err(PipelineError::UnsupportedFile(bad.file_name.clone()));
        }

        self.reset()?;
        tracing::info!(files = files.len(), "Upload accepted");

        let extractor = self.collaborators.extractor.clone();
        self.run_stage(
            StageId::Ocr,
            move || extractor.extract(&files),
            |artifact: &OcrArtifact| {
                if artifact.extracted_text.trim().is_empty() {
                    Err(PipelineError::EmptyExtraction)
                } else {
                    Ok(())
                }
            },
            StageArtifact::Ocr,
        )
        .await
    }

    /// Replace the extracted text after a human correction.
    pub fn edit_ocr_text(&self, text: &str) -> Result<(), PipelineError> {
        let mut artifact = self.require(StageId::Ocr, PipelineState::ocr)?;
        artifact.extracted_text = text.to_string();
        self.with_state(|state| state.set_artifact(StageArtifact::Ocr(artifact)))
    }

    // ═══════════════════════════════════════════════════════════
    // Preprocess
    // ═══════════════════════════════════════════════════════════

    /// Clean the extracted text. Any earlier confirmation is withdrawn.
    pub async fn run_preprocess(&self) -> Result<PreprocessRecord, PipelineError> {
        let ocr = self.require(StageId::Ocr, PipelineState::ocr)?;
        if ocr.extracted_text.trim().is_empty() {
            return Err(PipelineError::EmptyExtraction);
        }
        self.ensure_idle(StageId::Preprocess)?;
        self.with_state(|state| state.confirm(Confirmation::Preprocess, false))?;

        let options = PreprocessOptions {
            language_hint: Some(ocr.language.clone()).filter(|l| !l.is_empty()),
        };
        let preprocessor = self.collaborators.preprocessor.clone();
        self.run_stage(
            StageId::Preprocess,
            move || preprocessor.preprocess(&ocr.extracted_text, &options),
            |_| Ok(()),
            StageArtifact::Preprocess,
        )
        .await
    }

    /// Editable text form of the preprocess result.
    pub fn preprocess_text(&self) -> Result<String, PipelineError> {
        let record = self.require(StageId::Preprocess, PipelineState::preprocess)?;
        Ok(serialize_preprocess(&record))
    }

    /// Parse the reviewed text, store it and unblock requirements.
    ///
    /// A parse failure leaves the state untouched.
    pub async fn confirm_preprocess(&self, text: &str) -> Result<PreprocessRecord, PipelineError> {
        self.ensure_idle(StageId::Preprocess)?;
        let record = parse_preprocess(text)?;

        let source_text = self.with_state(|state| {
            state.set_artifact(StageArtifact::Preprocess(record.clone()));
            state.set_status(StageId::Preprocess, StageStatus::Complete);
            state.confirm(Confirmation::Preprocess, true);
            state
                .ocr()
                .map(|ocr| ocr.extracted_text.clone())
                .unwrap_or_default()
        })?;
        tracing::info!(language = %record.language, "Preprocess confirmed");

        self.remember(preprocess_snapshot(&source_text, &record)).await;
        Ok(record)
    }

    // ═══════════════════════════════════════════════════════════
    // Requirements
    // ═══════════════════════════════════════════════════════════

    /// Extract requirements from the confirmed preprocess record.
    pub async fn run_requirements(
        &self,
        detect_structure: bool,
    ) -> Result<RequirementSet, PipelineError> {
        let record = self.require(StageId::Preprocess, PipelineState::preprocess)?;
        let source_text = record.cleaned_text.clone();

        let extractor = self.collaborators.requirements.clone();
        let set = self
            .run_stage(
                StageId::Requirements,
                move || extractor.extract_requirements(&record, detect_structure),
                |_| Ok(()),
                StageArtifact::Requirements,
            )
            .await?;

        tracing::debug!(
            solution = set.solution_requirements.len(),
            structure = set.response_structure_requirements.len(),
            "Requirements extracted"
        );
        self.remember(requirements_snapshot(&source_text, &set)).await;
        Ok(set)
    }

    /// Editable text form of the requirement set.
    pub fn requirements_text(&self) -> Result<String, PipelineError> {
        let set = self.require(StageId::Requirements, PipelineState::requirements)?;
        Ok(serialize_requirements(&set))
    }

    /// Parse an edited requirements text and store it.
    ///
    /// Only an extracted set can be edited, and only while the preprocess
    /// gate is open. Structure detection is carried over from the current
    /// set. The checks and the write happen under one lock.
    pub fn apply_requirements_edit(&self, text: &str) -> Result<RequirementSet, PipelineError> {
        let stage = StageId::Requirements;
        let set = self.with_state(|state| {
            state.ensure_runnable(stage)?;
            let prior = state
                .requirements()
                .ok_or(PipelineError::MissingArtifact { stage })?;
            let set = parse_requirements(text, prior.structure_detection.as_ref())?;
            state.set_artifact(StageArtifact::Requirements(set.clone()));
            state.set_status(stage, StageStatus::Complete);
            Ok::<_, PipelineError>(set)
        })??;
        tracing::info!(items = set.total_items(), "Requirements edit applied");
        Ok(set)
    }

    // ═══════════════════════════════════════════════════════════
    // Build query
    // ═══════════════════════════════════════════════════════════

    /// Build the response query. Any earlier confirmation is withdrawn.
    pub async fn run_build_query(&self) -> Result<BuildQuery, PipelineError> {
        let record = self.require(StageId::Preprocess, PipelineState::preprocess)?;
        let set = self.require(StageId::Requirements, PipelineState::requirements)?;
        self.ensure_idle(StageId::BuildQuery)?;
        self.with_state(|state| state.confirm(Confirmation::BuildQuery, false))?;

        let builder = self.collaborators.query_builder.clone();
        self.run_stage(
            StageId::BuildQuery,
            move || builder.build_query(&record, &set),
            |_| Ok(()),
            StageArtifact::BuildQuery,
        )
        .await
    }

    /// Mark the query as reviewed and unblock the response stage.
    pub async fn confirm_build_query(&self) -> Result<BuildQuery, PipelineError> {
        self.ensure_idle(StageId::BuildQuery)?;
        let mut query = self.require(StageId::BuildQuery, PipelineState::build_query)?;
        query.confirmed = true;

        let source_text = self.with_state(|state| {
            state.set_artifact(StageArtifact::BuildQuery(query.clone()));
            state.confirm(Confirmation::BuildQuery, true);
            state
                .preprocess()
                .map(|record| record.cleaned_text.clone())
                .unwrap_or_default()
        })?;
        tracing::info!("Build query confirmed");

        self.remember(build_query_snapshot(&source_text, &query)).await;
        Ok(query)
    }

    // ═══════════════════════════════════════════════════════════
    // Response
    // ═══════════════════════════════════════════════════════════

    pub async fn run_response(&self) -> Result<ResponseArtifact, PipelineError> {
        let record = self.require(StageId::Preprocess, PipelineState::preprocess)?;
        let set = self.require(StageId::Requirements, PipelineState::requirements)?;
        let query = self.require(StageId::BuildQuery, PipelineState::build_query)?;

        let responder = self.collaborators.responder.clone();
        self.run_stage(
            StageId::Response,
            move || responder.generate(&record, &set, &query),
            |_| Ok(()),
            StageArtifact::Response,
        )
        .await
    }

    pub fn response_body(&self) -> Result<String, PipelineError> {
        let response = self.require(StageId::Response, PipelineState::response)?;
        Ok(response.body())
    }

    /// Store an edited response body.
    ///
    /// Sentence deltas go to the memory store first; if that fails the edit
    /// is still saved. A reset while memory is being written discards the
    /// edit. Returns the number of deltas found.
    pub async fn save_response_edit(&self, edited: &str) -> Result<usize, PipelineError> {
        let stage = StageId::Response;
        let (mut response, requirements, generation) = self.with_state(|state| {
            if state.stored_status(stage) == StageStatus::Processing {
                return Err(PipelineError::transition(stage, "already processing"));
            }
            let response = state
                .response()
                .cloned()
                .ok_or(PipelineError::MissingArtifact { stage })?;
            Ok((response, state.requirements().cloned(), state.generation()))
        })??;

        let payload = EditMemoryPayload::from_edit(&response.body(), edited, requirements.as_ref());
        let deltas = payload.as_ref().map_or(0, |p| p.changed_sentences.len());

        if let Some(payload) = payload {
            let memory = self.collaborators.memory.clone();
            match tokio::task::spawn_blocking(move || memory.store_edit(&payload)).await {
                Ok(Ok(())) => tracing::info!(deltas, "Response edit sent to memory"),
                Ok(Err(e)) => tracing::warn!(deltas, error = %e, "Memory store failed, saving edit anyway"),
                Err(e) => tracing::warn!(error = %e, "Memory task failed, saving edit anyway"),
            }
        }

        response.set_body(edited);
        self.with_state(|state| {
            if state.generation() != generation {
                tracing::info!(
                    edit_generation = generation,
                    generation = state.generation(),
                    "Discarding response edit from before reset"
                );
                return Err(PipelineError::Superseded { stage });
            }
            state.set_artifact(StageArtifact::Response(response));
            Ok(())
        })??;
        Ok(deltas)
    }

    /// Prose and diagram segments of the current response body.
    pub fn segments(&self) -> Result<Vec<ContentSegment>, PipelineError> {
        Ok(segment_content(&self.response_body()?))
    }

    // ═══════════════════════════════════════════════════════════
    // Stored sessions
    // ═══════════════════════════════════════════════════════════

    /// Fetch a stored chat session. A missing or blank id returns `None`
    /// without a backend call.
    pub async fn load_session(&self, session_id: Option<&str>) -> Result<Option<Value>, PipelineError> {
        let Some(id) = session_id.map(str::trim).filter(|id| !id.is_empty()) else {
            return Ok(None);
        };
        let sessions = self.collaborators.sessions.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || sessions.fetch_session(&id))
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?
            .map_err(PipelineError::Lookup)
    }

    /// Fetch a session preview, with the same short-circuit as
    /// [`load_session`](Self::load_session).
    pub async fn load_preview(&self, session_id: Option<&str>) -> Result<Option<Value>, PipelineError> {
        let Some(id) = session_id.map(str::trim).filter(|id| !id.is_empty()) else {
            return Ok(None);
        };
        let sessions = self.collaborators.sessions.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || sessions.fetch_preview(&id))
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?
            .map_err(PipelineError::Lookup)
    }
}
