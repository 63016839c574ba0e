//! Pipeline state machine.
//!
//! Each stage stores one of `waiting | processing | complete | error`. What
//! the user sees is derived at read time by [`derive_status`], which adds
//! `blocked` for stages whose prerequisite is missing. Stored and derived
//! status never mix: nothing here ever stores `blocked`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{
    BuildQuery, Confirmation, DisplayStatus, OcrArtifact, PreprocessRecord, RequirementSet,
    ResponseArtifact, StageArtifact, StageId, StageStatus,
};

use super::PipelineError;

// ═══════════════════════════════════════════════════════════
// Status derivation
// ═══════════════════════════════════════════════════════════

/// Effective status of a stage.
///
/// A stored error always wins, then a present artifact reads as complete.
/// A waiting stage whose prerequisite is unmet reads as blocked.
pub fn derive_status(
    stored: StageStatus,
    has_artifact: bool,
    prerequisite_met: bool,
) -> DisplayStatus {
    match stored {
        StageStatus::Error => DisplayStatus::Error,
        _ if has_artifact => DisplayStatus::Complete,
        StageStatus::Waiting if !prerequisite_met => DisplayStatus::Blocked,
        other => other.into(),
    }
}

// ═══════════════════════════════════════════════════════════
// Tickets
// ═══════════════════════════════════════════════════════════

/// Proof that a stage was started under a particular generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTicket {
    pub stage: StageId,
    pub generation: u64,
}

/// What a collaborator call produced.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Completed(StageArtifact),
    Failed(String),
}

// ═══════════════════════════════════════════════════════════
// PipelineState
// ═══════════════════════════════════════════════════════════

/// Everything the pipeline knows about the current document.
#[derive(Debug, Clone)]
pub struct PipelineState {
    statuses: BTreeMap<StageId, StageStatus>,
    errors: BTreeMap<StageId, String>,
    artifacts: BTreeMap<StageId, StageArtifact>,
    preprocess_confirmed: bool,
    build_query_confirmed: bool,
    generation: u64,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            statuses: StageId::ALL
                .iter()
                .map(|stage| (*stage, StageStatus::Waiting))
                .collect(),
            errors: BTreeMap::new(),
            artifacts: BTreeMap::new(),
            preprocess_confirmed: false,
            build_query_confirmed: false,
            generation: 0,
        }
    }

    // ── Reads ───────────────────────────────────────────────

    pub fn stored_status(&self, stage: StageId) -> StageStatus {
        self.statuses
            .get(&stage)
            .copied()
            .unwrap_or(StageStatus::Waiting)
    }

    pub fn error(&self, stage: StageId) -> Option<&str> {
        self.errors.get(&stage).map(String::as_str)
    }

    pub fn artifact(&self, stage: StageId) -> Option<&StageArtifact> {
        self.artifacts.get(&stage)
    }

    pub fn has_artifact(&self, stage: StageId) -> bool {
        self.artifacts.contains_key(&stage)
    }

    pub fn is_confirmed(&self, flag: Confirmation) -> bool {
        match flag {
            Confirmation::Preprocess => self.preprocess_confirmed,
            Confirmation::BuildQuery => self.build_query_confirmed,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn ocr(&self) -> Option<&OcrArtifact> {
        match self.artifact(StageId::Ocr) {
            Some(StageArtifact::Ocr(artifact)) => Some(artifact),
            _ => None,
        }
    }

    pub fn preprocess(&self) -> Option<&PreprocessRecord> {
        match self.artifact(StageId::Preprocess) {
            Some(StageArtifact::Preprocess(record)) => Some(record),
            _ => None,
        }
    }

    pub fn requirements(&self) -> Option<&RequirementSet> {
        match self.artifact(StageId::Requirements) {
            Some(StageArtifact::Requirements(set)) => Some(set),
            _ => None,
        }
    }

    pub fn build_query(&self) -> Option<&BuildQuery> {
        match self.artifact(StageId::BuildQuery) {
            Some(StageArtifact::BuildQuery(query)) => Some(query),
            _ => None,
        }
    }

    pub fn response(&self) -> Option<&ResponseArtifact> {
        match self.artifact(StageId::Response) {
            Some(StageArtifact::Response(response)) => Some(response),
            _ => None,
        }
    }

    /// Whether the stage's upstream gate is open.
    pub fn prerequisite_met(&self, stage: StageId) -> bool {
        match stage {
            StageId::Ocr | StageId::Preprocess => true,
            StageId::Requirements => self.preprocess_confirmed,
            StageId::BuildQuery => self.has_artifact(StageId::Requirements),
            StageId::Response => self.build_query_confirmed,
        }
    }

    pub fn display_status(&self, stage: StageId) -> DisplayStatus {
        derive_status(
            self.stored_status(stage),
            self.has_artifact(stage),
            self.prerequisite_met(stage),
        )
    }

    /// Share of stages that read as complete, rounded to a whole percent.
    pub fn progress_percent(&self) -> u8 {
        let complete = StageId::ALL
            .iter()
            .filter(|stage| self.display_status(**stage) == DisplayStatus::Complete)
            .count();
        (100.0 * complete as f64 / StageId::ALL.len() as f64).round() as u8
    }

    /// First processing stage, else first waiting stage, in pipeline order.
    pub fn current_step(&self) -> Option<StageId> {
        let first_with = |status: DisplayStatus| {
            StageId::ALL
                .iter()
                .copied()
                .find(|stage| self.display_status(*stage) == status)
        };
        first_with(DisplayStatus::Processing).or_else(|| first_with(DisplayStatus::Waiting))
    }

    // ── Mutations ───────────────────────────────────────────

    /// Store an artifact under the stage its variant names. Statuses are
    /// left alone.
    pub fn set_artifact(&mut self, artifact: StageArtifact) {
        self.artifacts.insert(artifact.stage(), artifact);
    }

    pub fn clear_artifact(&mut self, stage: StageId) {
        self.artifacts.remove(&stage);
    }

    /// Overwrite the stored status. Leaving `error` drops its message.
    pub fn set_status(&mut self, stage: StageId, status: StageStatus) {
        self.statuses.insert(stage, status);
        if status != StageStatus::Error {
            self.errors.remove(&stage);
        }
    }

    pub fn set_error(&mut self, stage: StageId, message: impl Into<String>) {
        self.statuses.insert(stage, StageStatus::Error);
        self.errors.insert(stage, message.into());
    }

    pub fn confirm(&mut self, flag: Confirmation, value: bool) {
        match flag {
            Confirmation::Preprocess => self.preprocess_confirmed = value,
            Confirmation::BuildQuery => self.build_query_confirmed = value,
        }
    }

    /// Back to the initial state. The generation moves forward so tickets
    /// issued before the reset no longer settle.
    pub fn reset(&mut self) {
        let generation = self.generation + 1;
        *self = Self::new();
        self.generation = generation;
        tracing::debug!(generation, "Pipeline state reset");
    }

    // ── Ticketed transitions ────────────────────────────────

    /// Fail unless the stage's upstream gate is open and no run of it is in
    /// flight. Holding an artifact does not exempt a stage from its gate.
    pub fn ensure_runnable(&self, stage: StageId) -> Result<(), PipelineError> {
        if !self.prerequisite_met(stage) {
            return Err(PipelineError::transition(stage, blocked_reason(stage)));
        }
        if self.stored_status(stage) == StageStatus::Processing {
            return Err(PipelineError::transition(stage, "already processing"));
        }
        Ok(())
    }

    /// Mark a stage as processing and hand out a ticket for its result.
    pub fn begin(&mut self, stage: StageId) -> Result<StageTicket, PipelineError> {
        self.ensure_runnable(stage)?;
        self.set_status(stage, StageStatus::Processing);
        Ok(StageTicket {
            stage,
            generation: self.generation,
        })
    }

    /// Apply a stage result if its ticket is still current.
    ///
    /// Only the ticket's stage is touched. A stale ticket leaves the state
    /// unchanged and yields [`PipelineError::Superseded`].
    pub fn settle(
        &mut self,
        ticket: StageTicket,
        outcome: StageOutcome,
    ) -> Result<(), PipelineError> {
        if ticket.generation != self.generation {
            tracing::info!(
                stage = %ticket.stage,
                ticket_generation = ticket.generation,
                generation = self.generation,
                "Discarding late stage result"
            );
            return Err(PipelineError::Superseded {
                stage: ticket.stage,
            });
        }

        match outcome {
            StageOutcome::Completed(artifact) => {
                if artifact.stage() != ticket.stage {
                    let reason = format!("received a {} artifact", artifact.stage());
                    self.set_error(ticket.stage, reason.clone());
                    return Err(PipelineError::transition(ticket.stage, reason));
                }
                self.set_artifact(artifact);
                self.set_status(ticket.stage, StageStatus::Complete);
            }
            StageOutcome::Failed(message) => {
                self.set_error(ticket.stage, message);
            }
        }
        Ok(())
    }

    /// Read-only snapshot for display.
    pub fn view(&self) -> PipelineView {
        PipelineView {
            stages: StageId::ALL
                .iter()
                .map(|stage| StageView {
                    stage: *stage,
                    status: self.display_status(*stage),
                    error: self.error(*stage).map(str::to_string),
                    has_artifact: self.has_artifact(*stage),
                })
                .collect(),
            preprocess_confirmed: self.preprocess_confirmed,
            build_query_confirmed: self.build_query_confirmed,
            progress_percent: self.progress_percent(),
            current_step: self.current_step(),
            generation: self.generation,
        }
    }
}

fn blocked_reason(stage: StageId) -> &'static str {
    match stage {
        StageId::Requirements => "preprocess output is not confirmed",
        StageId::BuildQuery => "requirements have not been extracted",
        StageId::Response => "build query is not confirmed",
        StageId::Ocr | StageId::Preprocess => "blocked",
    }
}

// ═══════════════════════════════════════════════════════════
// View
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageView {
    pub stage: StageId,
    pub status: DisplayStatus,
    pub error: Option<String>,
    pub has_artifact: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineView {
    pub stages: Vec<StageView>,
    pub preprocess_confirmed: bool,
    pub build_query_confirmed: bool,
    pub progress_percent: u8,
    pub current_step: Option<StageId>,
    pub generation: u64,
}

impl PipelineView {
    pub fn status(&self, stage: StageId) -> Option<DisplayStatus> {
        self.stages
            .iter()
            .find(|view| view.stage == stage)
            .map(|view| view.status)
    }
}
