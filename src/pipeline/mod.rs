//! The five-stage RFP pipeline: state machine, collaborator seams, the HTTP
//! backend client and the async session that ties them together.

pub mod collaborators;
pub mod http;
#[cfg(test)]
pub(crate) mod mock;
pub mod session;
pub mod state;

pub use collaborators::{
    Collaborators, MemoryStore, PreprocessOptions, Preprocessor, QueryBuilder,
    RequirementsExtractor, ResponseGenerator, SessionStore, TextExtractor, UploadFile,
};
pub use http::BackendClient;
pub use session::PipelineSession;
pub use state::{PipelineState, PipelineView, StageOutcome, StageTicket};

use thiserror::Error;

use crate::codec::ValidationError;
use crate::models::StageId;

/// Failures of an external collaborator call.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("RFP backend is not reachable at {0}")]
    Connection(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("RFP backend returned error (status {status}): {body}")]
    Backend { status: u16, body: String },

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by [`PipelineSession`] and [`PipelineState`].
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Stage {stage} cannot run: {reason}")]
    StageTransition { stage: StageId, reason: String },

    #[error("Stage {stage} failed: {source}")]
    Collaborator {
        stage: StageId,
        #[source]
        source: CollaboratorError,
    },

    #[error("Result for stage {stage} arrived after a reset and was discarded")]
    Superseded { stage: StageId },

    #[error("Unsupported file type: {0} (expected .pdf, .docx or .doc)")]
    UnsupportedFile(String),

    #[error("No text could be extracted")]
    EmptyExtraction,

    #[error("Session lookup failed: {0}")]
    Lookup(#[source] CollaboratorError),

    #[error("Stage {stage} has no artifact yet")]
    MissingArtifact { stage: StageId },

    #[error("Pipeline state lock poisoned")]
    LockPoisoned,

    #[error("Background task failed: {0}")]
    Task(String),
}

impl PipelineError {
    pub(crate) fn transition(stage: StageId, reason: impl Into<String>) -> Self {
        Self::StageTransition {
            stage,
            reason: reason.into(),
        }
    }
}
