//! Error types for the pdf2matriz library.
//!
//! Three layers of errors reflect the three places a request can go wrong:
//!
//! * [`ExtractionError`] — the model answered, but no schema-conformant
//!   `{"Matriz": [...]}` object could be recovered from its text.
//!
//! * [`RemoteCallError`] — the LLM provider could not be reached, refused
//!   the request, or answered without the fields the workflow reads.
//!
//! * [`Pdf2MatrizError`] — **Fatal** for the request: every failure in the
//!   processing chain ends here. The HTTP front doors and the CLI turn it
//!   into one user-facing line via [`Pdf2MatrizError::user_message`]; no
//!   partial result is ever shown.
//!
//! [`RenderError`] stands apart: the table visualiser is an independent
//! entry point and only fails when it is handed text that is not JSON.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2matriz library.
#[derive(Debug, Error)]
pub enum Pdf2MatrizError {
    // ── Upload / storage errors ───────────────────────────────────────────
    /// The uploaded bytes could not be written under the storage root.
    #[error("Failed to save uploaded file '{path}': {source}")]
    UploadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A follow-up request named a path that resolves outside the storage root.
    #[error("Path '{path}' is outside the storage root")]
    PathTraversal { path: String },

    /// A required form field was not sent.
    #[error("Missing form field '{field}'")]
    MissingField { field: String },

    /// The path handed back by the client does not exist.
    #[error("File not found: '{path}'")]
    FileNotFound { path: String },

    /// Could not write one of the per-document artifacts.
    #[error("Failed to write artifact '{path}': {source}")]
    ArtifactWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// Network, provider, or response-shape failure.
    #[error(transparent)]
    RemoteCall(#[from] RemoteCallError),

    // ── Extraction errors ─────────────────────────────────────────────────
    /// No JSON could be located in, or parsed from, the model output.
    #[error("Could not extract JSON from the model response: {0}")]
    Extraction(ExtractionError),

    /// JSON was found but does not carry a `Matriz` array.
    #[error("Extracted JSON failed validation: {0}")]
    Validation(ExtractionError),

    /// Raw JSON handed to the visualiser could not be read.
    #[error(transparent)]
    Render(#[from] RenderError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// The prompt catalog is empty and no prompt key was given.
    #[error("Prompt '{key}' not found in the prompt catalog")]
    PromptNotFound { key: String },

    /// The prompt catalog file could not be read or parsed.
    #[error("Failed to load prompt catalog '{path}': {detail}")]
    CatalogLoad { path: PathBuf, detail: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2MatrizError {
    /// The single line shown to the user when a request fails.
    ///
    /// Internals (I/O sources, raw provider bodies) stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Pdf2MatrizError::UploadFailed { .. } => "Error saving the uploaded file.".to_string(),
            Pdf2MatrizError::MissingField { field } => format!("The form field '{field}' is required."),
            Pdf2MatrizError::PathTraversal { .. } | Pdf2MatrizError::FileNotFound { .. } => {
                "Invalid or missing file.".to_string()
            }
            Pdf2MatrizError::Render(e) => format!("Error reading the JSON: {e}"),
            Pdf2MatrizError::InvalidConfig(_)
            | Pdf2MatrizError::CatalogLoad { .. }
            | Pdf2MatrizError::Internal(_) => "The server is not configured correctly.".to_string(),
            Pdf2MatrizError::ArtifactWriteFailed { .. } => {
                "Processing error: the result could not be saved.".to_string()
            }
            Pdf2MatrizError::RemoteCall(e) => format!("Processing error: {}", e.user_message()),
            Pdf2MatrizError::Extraction(_) | Pdf2MatrizError::Validation(_) => {
                format!("Processing error: {self}")
            }
            Pdf2MatrizError::PromptNotFound { key } => {
                format!("Processing error: unknown prompt '{key}'.")
            }
        }
    }
}

/// Routes each extraction failure to the matching top-level category:
/// nothing locatable or unparsable is an extraction error, a present but
/// schema-incomplete object is a validation error.
impl From<ExtractionError> for Pdf2MatrizError {
    fn from(err: ExtractionError) -> Self {
        if err.is_validation() {
            Pdf2MatrizError::Validation(err)
        } else {
            Pdf2MatrizError::Extraction(err)
        }
    }
}

/// Failure to recover a `{"Matriz": [...]}` object from a model completion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// None of the strategies located a JSON candidate.
    #[error("no JSON object found in the model response")]
    NoJsonFound,

    /// A strategy matched, but the matched text is not valid JSON.
    #[error("extracted JSON is malformed: {detail}")]
    MalformedJson { detail: String },

    /// The parsed value is not an object with a `Matriz` key.
    #[error("JSON does not contain the key 'Matriz'")]
    MissingMatrizKey,

    /// `Matriz` is present but not an array.
    #[error("the key 'Matriz' does not contain an array")]
    MatrizNotArray,
}

impl ExtractionError {
    /// True for failures where JSON was found but is schema-incomplete.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ExtractionError::MissingMatrizKey | ExtractionError::MatrizNotArray
        )
    }
}

/// Failure talking to the LLM provider.
#[derive(Debug, Error)]
pub enum RemoteCallError {
    /// The HTTP request itself failed (DNS, TLS, connection reset, timeout).
    #[error("Request to the LLM provider failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("LLM API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    /// The provider body was not the JSON we expected.
    #[error("Failed to decode LLM provider response: {0}")]
    Decode(String),

    /// The file upload answer carries no `id`.
    #[error("The file upload response does not contain a file id")]
    MissingFileId,

    /// The Responses answer has no (or an empty) `output` array.
    #[error("The response does not contain 'output'")]
    MissingOutput,

    /// The last output item has no `content` entries.
    #[error("The last output item does not contain 'content'")]
    MissingContent,

    /// The first content entry of the last output item has no `text`.
    #[error("The response does not contain text in 'output[..].content[0].text'")]
    MissingText,

    /// The document could not be read for upload.
    #[error("Failed to read '{path}' for upload: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RemoteCallError {
    /// Fixed wording per failure; status codes and bodies are for the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            RemoteCallError::Http(_) => "the analysis service could not be reached.",
            RemoteCallError::Api { .. } => "the analysis service rejected the request.",
            RemoteCallError::Decode(_) => "the analysis service sent an unreadable answer.",
            RemoteCallError::MissingFileId => "the document upload was not acknowledged.",
            RemoteCallError::MissingOutput
            | RemoteCallError::MissingContent
            | RemoteCallError::MissingText => "the analysis service returned no text.",
            RemoteCallError::ReadFailed { .. } => "the document could not be read.",
        }
    }
}

/// Failure of the table visualiser's entry point.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The supplied text is not valid JSON.
    #[error("invalid JSON input: {detail}")]
    InvalidInput { detail: String },
}
