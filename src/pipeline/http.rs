//! Blocking HTTP client for the RFP backend. Implements every collaborator
//! trait against the backend's JSON endpoints.

use std::time::Duration;

use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::BackendConfig;
use crate::edit_memory::{EditMemoryPayload, StageSnapshot};
use crate::models::{BuildQuery, OcrArtifact, PreprocessRecord, RequirementSet, ResponseArtifact};

use super::collaborators::{
    MemoryStore, PreprocessOptions, Preprocessor, QueryBuilder, RequirementsExtractor,
    ResponseGenerator, SessionStore, TextExtractor, UploadFile,
};
use super::CollaboratorError;

/// HTTP client for the RFP backend.
pub struct BackendClient {
    base_url: String,
    client: Client,
    timeout_secs: u64,
    use_rag: bool,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| CollaboratorError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs: config.timeout_secs,
            use_rag: true,
        })
    }

    /// Client configured from `RFP_BACKEND_URL` / `RFP_BACKEND_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, CollaboratorError> {
        Self::new(&BackendConfig::from_env())
    }

    /// Whether response generation may use retrieval. On by default.
    pub fn with_rag(mut self, use_rag: bool) -> Self {
        self.use_rag = use_rag;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `true` when the backend answers `/health` with `status: "ok"`.
    pub fn health(&self) -> Result<bool, CollaboratorError> {
        #[derive(Deserialize)]
        struct Health {
            status: String,
        }

        let response = self.send(self.client.get(self.endpoint(&["health"])?))?;
        let health: Health = parse_json(response)?;
        Ok(health.status == "ok")
    }

    // ── Plumbing ────────────────────────────────────────────

    /// Join path segments onto the base URL, escaping each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, CollaboratorError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| CollaboratorError::HttpClient(format!("Invalid backend URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| {
                CollaboratorError::HttpClient(format!("Backend URL cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, CollaboratorError> {
        let response = request.send().map_err(|e| {
            if e.is_connect() {
                CollaboratorError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                CollaboratorError::Timeout(self.timeout_secs)
            } else {
                CollaboratorError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CollaboratorError::Backend {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, CollaboratorError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        tracing::debug!(path, "POST to RFP backend");
        let response = self.send(self.client.post(self.endpoint(&[path])?).json(body))?;
        parse_json(response)
    }

    fn post_ack<B: Serialize + ?Sized>(&self, path: &[&str], body: &B) -> Result<(), CollaboratorError> {
        self.send(self.client.post(self.endpoint(path)?).json(body))?;
        Ok(())
    }

    /// GET that maps 404 to `None`.
    fn get_optional(&self, segments: &[&str]) -> Result<Option<Value>, CollaboratorError> {
        match self.send(self.client.get(self.endpoint(segments)?)) {
            Ok(response) => parse_json(response).map(Some),
            Err(CollaboratorError::Backend { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn parse_json<R: DeserializeOwned>(response: Response) -> Result<R, CollaboratorError> {
    response
        .json()
        .map_err(|e| CollaboratorError::ResponseParsing(e.to_string()))
}

// ═══════════════════════════════════════════════════════════
// Request bodies
// ═══════════════════════════════════════════════════════════

#[derive(Serialize)]
struct PreprocessRequest<'a> {
    ocr_text: &'a str,
    #[serde(flatten)]
    options: &'a PreprocessOptions,
}

#[derive(Serialize)]
struct RequirementsRequest<'a> {
    essential_text: &'a str,
    preprocess: &'a PreprocessRecord,
    detect_structure: bool,
}

#[derive(Serialize)]
struct BuildQueryRequest<'a> {
    preprocess: &'a PreprocessRecord,
    requirements: &'a RequirementSet,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    preprocess: &'a PreprocessRecord,
    requirements: &'a RequirementSet,
    build_query: &'a BuildQuery,
    use_rag: bool,
}

// ═══════════════════════════════════════════════════════════
// Collaborator impls
// ═══════════════════════════════════════════════════════════

impl TextExtractor for BackendClient {
    fn extract(&self, files: &[UploadFile]) -> Result<OcrArtifact, CollaboratorError> {
        let mut form = multipart::Form::new();
        for file in files {
            let part = multipart::Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
            form = form.part("files", part);
        }
        tracing::debug!(files = files.len(), "Uploading documents for extraction");
        let response = self.send(self.client.post(self.endpoint(&["ocr"])?).multipart(form))?;
        parse_json(response)
    }
}

impl Preprocessor for BackendClient {
    fn preprocess(
        &self,
        raw_text: &str,
        options: &PreprocessOptions,
    ) -> Result<PreprocessRecord, CollaboratorError> {
        self.post_json(
            "run-preprocess",
            &PreprocessRequest {
                ocr_text: raw_text,
                options,
            },
        )
    }
}

impl RequirementsExtractor for BackendClient {
    fn extract_requirements(
        &self,
        preprocess: &PreprocessRecord,
        detect_structure: bool,
    ) -> Result<RequirementSet, CollaboratorError> {
        self.post_json(
            "run-requirements",
            &RequirementsRequest {
                essential_text: &preprocess.cleaned_text,
                preprocess,
                detect_structure,
            },
        )
    }
}

impl QueryBuilder for BackendClient {
    fn build_query(
        &self,
        preprocess: &PreprocessRecord,
        requirements: &RequirementSet,
    ) -> Result<BuildQuery, CollaboratorError> {
        self.post_json(
            "build-query",
            &BuildQueryRequest {
                preprocess,
                requirements,
            },
        )
    }
}

impl ResponseGenerator for BackendClient {
    fn generate(
        &self,
        preprocess: &PreprocessRecord,
        requirements: &RequirementSet,
        query: &BuildQuery,
    ) -> Result<ResponseArtifact, CollaboratorError> {
        self.post_json(
            "generate-response",
            &GenerateRequest {
                preprocess,
                requirements,
                build_query: query,
                use_rag: self.use_rag,
            },
        )
    }
}

impl MemoryStore for BackendClient {
    fn store_edit(&self, payload: &EditMemoryPayload) -> Result<(), CollaboratorError> {
        self.post_ack(&["memory", "edit"], payload)
    }

    fn store_snapshot(&self, snapshot: &StageSnapshot) -> Result<(), CollaboratorError> {
        self.post_ack(&["memory", "snapshot"], snapshot)
    }
}

impl SessionStore for BackendClient {
    fn fetch_session(&self, session_id: &str) -> Result<Option<Value>, CollaboratorError> {
        self.get_optional(&["chat", "session", session_id])
    }

    fn fetch_preview(&self, session_id: &str) -> Result<Option<Value>, CollaboratorError> {
        self.get_optional(&["chat", "session", session_id, "preview"])
    }
}
