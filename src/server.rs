//! HTTP front doors for the upload → confirm → process → visualise workflow.
//!
//! | Route             | Input                                              | Answer |
//! |-------------------|----------------------------------------------------|--------|
//! | `GET /health`     |                                                    | `{"status": "ok"}` |
//! | `GET /prompts`    |                                                    | the prompt catalog |
//! | `POST /upload`    | multipart `pdf`, `initial_prompt`                  | `awaiting_confirmation` + receipt |
//! | `POST /process`   | form `filepath`, `prompt_select`, `parametro_2`, … | `completed` + canonical JSON |
//! | `POST /visualize` | form `json_data` or a raw JSON body, `?format=html`| tables as JSON or HTML |
//!
//! Failures answer with a `failed` [`WorkflowState`] carrying one
//! user-facing message and, when the request got that far, the upload
//! receipt so the client can offer a retry.

use crate::config::ProcessConfig;
use crate::error::{Pdf2MatrizError, RenderError};
use crate::pipeline::llm::LlmClient;
use crate::pipeline::storage::{FileStore, LocalFileStore};
use crate::pipeline::tables::{self, DisplayTable};
use crate::process::{self, RequestContext, UploadReceipt, UploadRequest};
use crate::prompts::PromptCatalog;
use crate::workflow::WorkflowState;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Largest accepted visualiser body.
const MAX_VISUALIZE_BYTES: usize = 10 * 1024 * 1024;

/// Shared, read-only dependencies of every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProcessConfig>,
    pub store: Arc<dyn FileStore>,
    pub client: Arc<dyn LlmClient>,
    pub catalog: Arc<PromptCatalog>,
}

impl AppState {
    /// State backed by a [`LocalFileStore`] at the configured storage root.
    pub fn new(config: ProcessConfig, client: Arc<dyn LlmClient>, catalog: PromptCatalog) -> Self {
        let store = Arc::new(LocalFileStore::new(config.storage_root.clone()));
        Self {
            config: Arc::new(config),
            store,
            client,
            catalog: Arc::new(catalog),
        }
    }
}

/// Creates the Axum router with all the application routes.
pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/prompts", get(prompts_handler))
        .route(
            "/upload",
            post(upload_handler).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/process", post(process_handler))
        .route("/visualize", post(visualize_handler))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// A failed request, answered as a `failed` workflow state.
#[derive(Debug)]
pub struct AppError {
    pub error: Pdf2MatrizError,
    pub receipt: Option<UploadReceipt>,
}

impl AppError {
    pub fn with_receipt(error: Pdf2MatrizError, receipt: UploadReceipt) -> Self {
        Self {
            error,
            receipt: Some(receipt),
        }
    }
}

impl From<Pdf2MatrizError> for AppError {
    fn from(error: Pdf2MatrizError) -> Self {
        Self {
            error,
            receipt: None,
        }
    }
}

impl From<RenderError> for AppError {
    fn from(err: RenderError) -> Self {
        Pdf2MatrizError::from(err).into()
    }
}

/// HTTP status for a library error.
pub fn status_for(error: &Pdf2MatrizError) -> StatusCode {
    match error {
        Pdf2MatrizError::PathTraversal { .. }
        | Pdf2MatrizError::MissingField { .. }
        | Pdf2MatrizError::Render(_) => StatusCode::BAD_REQUEST,
        Pdf2MatrizError::FileNotFound { .. } => StatusCode::NOT_FOUND,
        Pdf2MatrizError::RemoteCall(_)
        | Pdf2MatrizError::Extraction(_)
        | Pdf2MatrizError::Validation(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(&self.error);
        error!("Request failed ({}): {}", status.as_u16(), self.error);
        let body = WorkflowState::Failed {
            receipt: self.receipt,
            message: self.error.user_message(),
        };
        (status, Json(body)).into_response()
    }
}

fn transition_error(e: crate::workflow::TransitionError) -> Pdf2MatrizError {
    Pdf2MatrizError::Internal(e.to_string())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn prompts_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "prompts": app_state.catalog.entries() }))
}

/// `POST /upload`: store the PDF, answer with the receipt to confirm.
async fn upload_handler(
    State(app_state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<WorkflowState>, AppError> {
    let mut pdf: Option<(String, Vec<u8>)> = None;
    let mut prompt_key: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "pdf" => {
                let file_name = field.file_name().unwrap_or("upload.pdf").to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                pdf = Some((file_name, bytes.to_vec()));
            }
            "initial_prompt" => {
                prompt_key = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let (file_name, bytes) = pdf.ok_or_else(|| Pdf2MatrizError::MissingField {
        field: "pdf".to_string(),
    })?;
    info!("Upload received: {} ({} bytes)", file_name, bytes.len());

    let receipt = process::upload_document(
        app_state.store.as_ref(),
        UploadRequest {
            file_name,
            bytes,
            prompt_key,
        },
    )
    .await?;

    let state = WorkflowState::AwaitingUpload
        .uploaded(receipt)
        .map_err(transition_error)?;
    Ok(Json(state))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> Pdf2MatrizError {
    Pdf2MatrizError::UploadFailed {
        path: "<multipart>".into(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e.body_text()),
    }
}

/// `POST /process`: run the processing step on a confirmed upload.
async fn process_handler(
    State(app_state): State<AppState>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Json<WorkflowState>, AppError> {
    let ctx = RequestContext::from_fields(fields);
    if ctx.file_path.trim().is_empty() {
        return Err(Pdf2MatrizError::MissingField {
            field: process::FILEPATH_FIELD.to_string(),
        }
        .into());
    }
    let receipt = UploadReceipt::from_context(&ctx);
    let processing = WorkflowState::AwaitingConfirmation {
        receipt: receipt.clone(),
    }
    .confirm()
    .map_err(transition_error)?;

    match process::process_document(
        &ctx,
        &app_state.config,
        app_state.client.as_ref(),
        &app_state.catalog,
    )
    .await
    {
        Ok(output) => {
            let state = processing.complete(output).map_err(transition_error)?;
            Ok(Json(state))
        }
        Err(e) => Err(AppError::with_receipt(e, receipt)),
    }
}

#[derive(Debug, Default, Deserialize)]
struct VisualizeParams {
    format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VisualizeForm {
    json_data: Option<String>,
    format: Option<String>,
}

#[derive(Debug, Serialize)]
struct VisualizeResponse {
    tables: Vec<DisplayTable>,
}

/// `POST /visualize`: render stored or pasted JSON as tables.
async fn visualize_handler(
    Query(params): Query<VisualizeParams>,
    request: Request,
) -> Result<Response, AppError> {
    let is_form = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

    let (text, format) = if is_form {
        let Form(form) = Form::<VisualizeForm>::from_request(request, &())
            .await
            .map_err(|e| RenderError::InvalidInput {
                detail: e.body_text(),
            })?;
        (form.json_data.unwrap_or_default(), form.format.or(params.format))
    } else {
        let bytes = axum::body::to_bytes(request.into_body(), MAX_VISUALIZE_BYTES)
            .await
            .map_err(|e| RenderError::InvalidInput {
                detail: e.to_string(),
            })?;
        (String::from_utf8_lossy(&bytes).into_owned(), params.format)
    };

    if text.trim().is_empty() {
        return Err(RenderError::InvalidInput {
            detail: "no JSON data received".to_string(),
        }
        .into());
    }

    let rendered = tables::render_str(&text)?;
    if format.as_deref() == Some("html") {
        Ok(Html(tables::render_html(&rendered)).into_response())
    } else {
        Ok(Json(VisualizeResponse { tables: rendered }).into_response())
    }
}
