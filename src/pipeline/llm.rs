//! LLM interaction: upload the document, ask for the analysis, read the reply.
//!
//! The workflow needs three provider calls, all behind [`LlmClient`] so the
//! processing step can be driven by a mock in tests:
//!
//! 1. `POST /files` — multipart upload of the PDF, answers `{"id": ...}`
//! 2. `POST /responses` — the analysis request, the PDF attached by id
//! 3. `GET /models` — cheap key check, consumes no tokens
//!
//! There is no retry loop here. A failed call fails the request, and the
//! user retries from the confirmation step with the file already stored.
//!
//! ## Reading the completion
//!
//! A Responses answer is `{"output": [...]}`; reasoning models put
//! reasoning items first, so the text is read from the **last** output
//! item's `content[0].text`. A missing `output`, `content`, or `text` is a
//! distinct [`RemoteCallError`] each.

use crate::config::ProcessConfig;
use crate::error::{Pdf2MatrizError, RemoteCallError};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Body of a `POST /responses` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponsesRequest {
    pub model: String,
    pub instructions: String,
    pub input: Vec<InputMessage>,
    pub stream: bool,
}

/// One conversation turn of a Responses request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputMessage {
    pub role: String,
    pub content: Vec<InputContent>,
}

/// A content part of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputContent {
    InputText { text: String },
    InputFile { file_id: String },
}

impl ResponsesRequest {
    /// A non-streaming request: instructions as the system side, one user
    /// turn carrying `user_text` and the uploaded file.
    pub fn for_document(
        model: impl Into<String>,
        instructions: impl Into<String>,
        user_text: impl Into<String>,
        file_id: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            instructions: instructions.into(),
            input: vec![InputMessage {
                role: "user".to_string(),
                content: vec![
                    InputContent::InputText {
                        text: user_text.into(),
                    },
                    InputContent::InputFile {
                        file_id: file_id.into(),
                    },
                ],
            }],
            stream: false,
        }
    }
}

/// The model's reply: the completion text plus the raw provider body.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub raw: Value,
}

/// Outcome of [`LlmClient::check_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStatus {
    /// 200: the key works.
    Valid,
    /// 401: the key is invalid or revoked.
    Unauthorized,
    /// 429: the key works but the account is rate-limited or out of credit.
    RateLimited,
    /// Anything else.
    Unexpected { status: u16, body: String },
}

impl KeyStatus {
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::OK => KeyStatus::Valid,
            StatusCode::UNAUTHORIZED => KeyStatus::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => KeyStatus::RateLimited,
            other => KeyStatus::Unexpected {
                status: other.as_u16(),
                body,
            },
        }
    }
}

/// The provider calls the workflow depends on.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Upload the document and return the provider's file id.
    async fn upload(&self, path: &Path) -> Result<String, RemoteCallError>;

    /// Run a Responses request and return the completion.
    async fn respond(&self, request: &ResponsesRequest) -> Result<Completion, RemoteCallError>;

    /// Check whether the configured key is accepted.
    async fn check_key(&self) -> Result<KeyStatus, RemoteCallError>;
}

/// Read the completion text out of a Responses body.
pub fn completion_text(response: &Value) -> Result<String, RemoteCallError> {
    let last = response
        .get("output")
        .and_then(Value::as_array)
        .and_then(|items| items.last())
        .ok_or(RemoteCallError::MissingOutput)?;

    let first = last
        .get("content")
        .and_then(Value::as_array)
        .and_then(|parts| parts.first())
        .ok_or(RemoteCallError::MissingContent)?;

    first
        .get("text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(RemoteCallError::MissingText)
}

// ── OpenAI implementation ────────────────────────────────────────────────────

/// [`LlmClient`] for the OpenAI Files and Responses APIs (or any endpoint
/// that speaks them).
#[derive(Clone, Debug)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    file_purpose: String,
}

impl OpenAiClient {
    pub fn new(config: &ProcessConfig) -> Result<Self, Pdf2MatrizError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.api_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| Pdf2MatrizError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            file_purpose: config.file_purpose.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn json_body(response: reqwest::Response) -> Result<Value, RemoteCallError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteCallError::Api {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| RemoteCallError::Decode(e.to_string()))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn upload(&self, path: &Path) -> Result<String, RemoteCallError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RemoteCallError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());
        debug!("Uploading {} ({} bytes)", file_name, bytes.len());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/pdf")?;
        let form = Form::new()
            .text("purpose", self.file_purpose.clone())
            .part("file", part);

        let response = self
            .authorized(self.client.post(self.url("files")))
            .multipart(form)
            .send()
            .await?;
        let body = Self::json_body(response).await?;

        let id = body
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or(RemoteCallError::MissingFileId)?;
        info!("Uploaded file id: {}", id);
        Ok(id.to_string())
    }

    async fn respond(&self, request: &ResponsesRequest) -> Result<Completion, RemoteCallError> {
        debug!("Calling Responses with model {}", request.model);
        let response = self
            .authorized(self.client.post(self.url("responses")))
            .json(request)
            .send()
            .await?;
        let raw = Self::json_body(response).await?;
        let text = completion_text(&raw)?;
        Ok(Completion { text, raw })
    }

    async fn check_key(&self) -> Result<KeyStatus, RemoteCallError> {
        let response = self
            .authorized(self.client.get(self.url("models")))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Ok(KeyStatus::from_status(status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serialises_to_responses_shape() {
        let req = ResponsesRequest::for_document("gpt-5.1", "Instrucciones", "Analiza", "file-123");
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(
            v,
            json!({
                "model": "gpt-5.1",
                "instructions": "Instrucciones",
                "input": [{
                    "role": "user",
                    "content": [
                        {"type": "input_text", "text": "Analiza"},
                        {"type": "input_file", "file_id": "file-123"}
                    ]
                }],
                "stream": false
            })
        );
    }

    #[test]
    fn completion_text_reads_last_output() {
        let body = json!({"output": [
            {"type": "reasoning", "content": []},
            {"type": "message", "content": [{"type": "output_text", "text": "hola"}]}
        ]});
        assert_eq!(completion_text(&body).unwrap(), "hola");
    }

    #[test]
    fn completion_text_missing_output() {
        assert!(matches!(
            completion_text(&json!({"id": "resp"})),
            Err(RemoteCallError::MissingOutput)
        ));
        assert!(matches!(
            completion_text(&json!({"output": []})),
            Err(RemoteCallError::MissingOutput)
        ));
    }

    #[test]
    fn completion_text_missing_content() {
        assert!(matches!(
            completion_text(&json!({"output": [{"type": "message"}]})),
            Err(RemoteCallError::MissingContent)
        ));
        assert!(matches!(
            completion_text(&json!({"output": [{"content": []}]})),
            Err(RemoteCallError::MissingContent)
        ));
    }

    #[test]
    fn completion_text_missing_text() {
        assert!(matches!(
            completion_text(&json!({"output": [{"content": [{"type": "refusal"}]}]})),
            Err(RemoteCallError::MissingText)
        ));
    }

    #[test]
    fn key_status_classification() {
        assert_eq!(KeyStatus::from_status(StatusCode::OK, String::new()), KeyStatus::Valid);
        assert_eq!(
            KeyStatus::from_status(StatusCode::UNAUTHORIZED, String::new()),
            KeyStatus::Unauthorized
        );
        assert_eq!(
            KeyStatus::from_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            KeyStatus::RateLimited
        );
        assert_eq!(
            KeyStatus::from_status(StatusCode::BAD_GATEWAY, "down".into()),
            KeyStatus::Unexpected {
                status: 502,
                body: "down".into()
            }
        );
    }

    #[test]
    fn client_trims_base_url() {
        let config = ProcessConfig::builder()
            .api_base_url("http://localhost:1/v1/")
            .build()
            .unwrap();
        let client = OpenAiClient::new(&config).unwrap();
        assert_eq!(client.url("files"), "http://localhost:1/v1/files");
    }
}
