//! Seams to the services that do the heavy lifting: text extraction, the
//! language-model stages, the memory store and the session store.
//!
//! All traits are synchronous and `Send + Sync`; the session runs them on the
//! blocking pool.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::edit_memory::{EditMemoryPayload, StageSnapshot};
use crate::models::{BuildQuery, OcrArtifact, PreprocessRecord, RequirementSet, ResponseArtifact};

use super::CollaboratorError;

/// Extensions accepted for upload, lowercase.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx", "doc"];

/// One uploaded document held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Read a file from disk, keeping only its file name.
    pub fn from_path(path: &Path) -> Result<Self, CollaboratorError> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { file_name, bytes })
    }

    /// Lowercase extension, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }

    pub fn is_supported(&self) -> bool {
        self.extension()
            .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
    }
}

/// Extra inputs for the preprocess stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreprocessOptions {
    /// Language reported by extraction, passed along as a hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_hint: Option<String>,
}

pub trait TextExtractor: Send + Sync {
    fn extract(&self, files: &[UploadFile]) -> Result<OcrArtifact, CollaboratorError>;
}

pub trait Preprocessor: Send + Sync {
    fn preprocess(
        &self,
        raw_text: &str,
        options: &PreprocessOptions,
    ) -> Result<PreprocessRecord, CollaboratorError>;
}

pub trait RequirementsExtractor: Send + Sync {
    fn extract_requirements(
        &self,
        preprocess: &PreprocessRecord,
        detect_structure: bool,
    ) -> Result<RequirementSet, CollaboratorError>;
}

pub trait QueryBuilder: Send + Sync {
    fn build_query(
        &self,
        preprocess: &PreprocessRecord,
        requirements: &RequirementSet,
    ) -> Result<BuildQuery, CollaboratorError>;
}

pub trait ResponseGenerator: Send + Sync {
    fn generate(
        &self,
        preprocess: &PreprocessRecord,
        requirements: &RequirementSet,
        query: &BuildQuery,
    ) -> Result<ResponseArtifact, CollaboratorError>;
}

/// Long-term memory. Callers treat failures as non-fatal.
pub trait MemoryStore: Send + Sync {
    fn store_edit(&self, payload: &EditMemoryPayload) -> Result<(), CollaboratorError>;
    fn store_snapshot(&self, snapshot: &StageSnapshot) -> Result<(), CollaboratorError>;
}

/// Read-only lookups of stored chat sessions. `Ok(None)` means not found.
pub trait SessionStore: Send + Sync {
    fn fetch_session(&self, session_id: &str) -> Result<Option<Value>, CollaboratorError>;
    fn fetch_preview(&self, session_id: &str) -> Result<Option<Value>, CollaboratorError>;
}

/// Every collaborator the session needs.
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn TextExtractor>,
    pub preprocessor: Arc<dyn Preprocessor>,
    pub requirements: Arc<dyn RequirementsExtractor>,
    pub query_builder: Arc<dyn QueryBuilder>,
    pub responder: Arc<dyn ResponseGenerator>,
    pub memory: Arc<dyn MemoryStore>,
    pub sessions: Arc<dyn SessionStore>,
}

impl Collaborators {
    /// Use one backend for every seam.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: TextExtractor
            + Preprocessor
            + RequirementsExtractor
            + QueryBuilder
            + ResponseGenerator
            + MemoryStore
            + SessionStore
            + 'static,
    {
        Self {
            extractor: backend.clone(),
            preprocessor: backend.clone(),
            requirements: backend.clone(),
            query_builder: backend.clone(),
            responder: backend.clone(),
            memory: backend.clone(),
            sessions: backend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_extensions_are_case_insensitive() {
        assert!(UploadFile::new("rfp.PDF", vec![]).is_supported());
        assert!(UploadFile::new("tender.docx", vec![]).is_supported());
        assert!(UploadFile::new("legacy.Doc", vec![]).is_supported());
        assert!(!UploadFile::new("notes.txt", vec![]).is_supported());
        assert!(!UploadFile::new("no_extension", vec![]).is_supported());
    }

    #[test]
    fn from_path_reads_bytes_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rfp.pdf");
        std::fs::write(&path, b"%PDF-1.7").unwrap();

        let file = UploadFile::from_path(&path).unwrap();
        assert_eq!(file.file_name, "rfp.pdf");
        assert_eq!(file.bytes, b"%PDF-1.7");
        assert_eq!(file.extension().as_deref(), Some("pdf"));
    }

    #[test]
    fn from_path_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = UploadFile::from_path(&dir.path().join("absent.pdf")).unwrap_err();
        assert!(matches!(err, CollaboratorError::Io(_)));
    }

    #[test]
    fn options_omit_missing_hint() {
        let json = serde_json::to_value(PreprocessOptions::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
