//! Request-scoped entry points: the upload step and the processing step.
//!
//! The two steps run on separate requests. The upload step stores the PDF
//! and hands back an [`UploadReceipt`]; the client shows it to the user,
//! who confirms, and the processing step receives the receipt's path back
//! inside a [`RequestContext`]. Nothing is carried between the two except
//! that path, so it is re-validated against the storage root before use.

use crate::config::ProcessConfig;
use crate::error::Pdf2MatrizError;
use crate::pipeline::extract::{self, StrategyKind};
use crate::pipeline::llm::{LlmClient, ResponsesRequest};
use crate::pipeline::normalize;
use crate::pipeline::storage::{self, ArtifactPaths, FileStore, ProcessLog};
use crate::progress::ProcessStage;
use crate::prompts::{PromptCatalog, ResolvedPrompt, MODEL_PARAMETER};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Form field carrying the stored document path.
pub const FILEPATH_FIELD: &str = "filepath";

/// Form field carrying the selected prompt key.
pub const PROMPT_FIELD: &str = "prompt_select";

/// Everything one processing request needs to know, gathered from the
/// request up front.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Path from the upload receipt. Untrusted.
    pub file_path: String,
    pub prompt_key: Option<String>,
    pub requested_model: Option<String>,
    /// Remaining prompt parameters, by field name.
    pub parameters: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            ..Default::default()
        }
    }

    pub fn with_prompt(mut self, key: impl Into<String>) -> Self {
        self.prompt_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.requested_model = Some(model.into());
        self
    }

    /// Build a context from confirmation-form fields.
    ///
    /// `filepath`, `prompt_select` and `parametro_2` (the model) are lifted
    /// into their own fields; everything else lands in `parameters`. Blank
    /// values count as absent.
    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut ctx = Self::default();
        for (key, value) in fields {
            let key = key.into();
            let value = value.into();
            let present = !value.trim().is_empty();
            match key.as_str() {
                FILEPATH_FIELD => ctx.file_path = value,
                PROMPT_FIELD if present => ctx.prompt_key = Some(value),
                MODEL_PARAMETER if present => ctx.requested_model = Some(value),
                PROMPT_FIELD | MODEL_PARAMETER => {}
                _ => {
                    ctx.parameters.insert(key, value);
                }
            }
        }
        ctx
    }
}

// ── Upload step ──────────────────────────────────────────────────────────────

/// An uploaded document as it arrives from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub prompt_key: Option<String>,
}

/// Proof of a stored upload, echoed back by the client on confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub path: PathBuf,
    pub name: String,
    pub prompt_key: Option<String>,
}

impl UploadReceipt {
    /// Rebuild the receipt a processing request refers to.
    pub fn from_context(ctx: &RequestContext) -> Self {
        Self {
            path: PathBuf::from(&ctx.file_path),
            name: storage::base_name(&ctx.file_path),
            prompt_key: ctx.prompt_key.clone(),
        }
    }
}

/// Store an uploaded document and return its receipt.
pub async fn upload_document(
    store: &dyn FileStore,
    request: UploadRequest,
) -> Result<UploadReceipt, Pdf2MatrizError> {
    let name = storage::base_name(&request.file_name);
    let path = store.save(&request.bytes, &name).await?;
    info!("Upload stored: {} ({} bytes)", path.display(), request.bytes.len());
    Ok(UploadReceipt {
        path,
        name,
        prompt_key: request
            .prompt_key
            .filter(|k| !k.trim().is_empty()),
    })
}

// ── Processing step ──────────────────────────────────────────────────────────

/// Result of a successful processing run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutput {
    /// Canonical JSON, as written to `<file>.result.json`.
    pub canonical_json: String,
    /// Number of `Matriz` elements.
    pub element_count: usize,
    /// Provider handle of the uploaded document.
    pub file_id: String,
    /// Model actually used, after policy coercion.
    pub model: String,
    /// Extraction strategy that located the JSON.
    pub strategy: StrategyKind,
    pub result_path: PathBuf,
    pub prompt: ResolvedPrompt,
}

/// Run the full processing chain for one confirmed upload.
///
/// # Errors
/// Every failure is fatal for the request. Once the document path has been
/// validated, the failure is also appended to the document's `process.log`
/// as an `ERROR:` line. Artifacts written before the failure point stay;
/// nothing is written after it.
pub async fn process_document(
    ctx: &RequestContext,
    config: &ProcessConfig,
    client: &dyn LlmClient,
    catalog: &PromptCatalog,
) -> Result<ProcessOutput, Pdf2MatrizError> {
    let cb = config.progress_callback.as_ref();

    // ── Step 1: Re-validate the path from the receipt ───────────────────
    let resolved = storage::resolve_within_root(&config.storage_root, &ctx.file_path).await;
    let document = match resolved {
        Ok(p) => p,
        Err(e) => {
            error!("Rejected processing request for '{}': {}", ctx.file_path, e);
            if let Some(cb) = cb {
                cb.on_process_error(&e.to_string());
            }
            return Err(e);
        }
    };
    let artifacts = ArtifactPaths::for_document(&document);
    let log = ProcessLog::new(&artifacts.log);

    if let Some(cb) = cb {
        cb.on_process_start(&storage::base_name(&ctx.file_path));
    }

    match run_steps(ctx, config, client, catalog, &artifacts, &log).await {
        Ok(output) => {
            if let Some(cb) = cb {
                cb.on_process_complete(output.element_count);
            }
            Ok(output)
        }
        Err(e) => {
            error!("Processing failed for {}: {}", document.display(), e);
            log.append(&format!("ERROR: {e}")).await;
            if let Some(cb) = cb {
                cb.on_process_error(&e.to_string());
            }
            Err(e)
        }
    }
}

async fn run_steps(
    ctx: &RequestContext,
    config: &ProcessConfig,
    client: &dyn LlmClient,
    catalog: &PromptCatalog,
    artifacts: &ArtifactPaths,
    log: &ProcessLog,
) -> Result<ProcessOutput, Pdf2MatrizError> {
    let start = Instant::now();
    let stage = |s: ProcessStage| {
        if let Some(cb) = config.progress_callback.as_ref() {
            cb.on_stage(s);
        }
    };

    // ── Step 2: Start the log, pick the prompt ──────────────────────────
    log.append(&format!(
        "Processing started for {}",
        artifacts.document.display()
    ))
    .await;
    let prompt = catalog.resolve(ctx.prompt_key.as_deref())?;
    log.append(&format!("Prompt: {} ({})", prompt.name, prompt.key))
        .await;
    info!("Processing {} with prompt '{}'", artifacts.document.display(), prompt.key);
    if !ctx.parameters.is_empty() {
        debug!("Prompt parameters: {:?}", ctx.parameters);
    }

    // ── Step 3: Upload the document ─────────────────────────────────────
    stage(ProcessStage::UploadingFile);
    let file_id = client.upload(&artifacts.document).await?;
    storage::write_artifact(&artifacts.file_id, &file_id).await?;
    log.append(&format!("File uploaded, file_id: {file_id}")).await;

    // ── Step 4: Pick the model ──────────────────────────────────────────
    let choice = config
        .model_policy
        .resolve(ctx.requested_model.as_deref());
    if let Some(ref requested) = choice.coerced_from {
        warn!("Model '{}' is not allowed, using '{}'", requested, choice.model);
        log.append(&format!(
            "Requested model '{requested}' not allowed, using '{}'",
            choice.model
        ))
        .await;
    }

    // ── Step 5: Build the request ───────────────────────────────────────
    let request = ResponsesRequest::for_document(
        choice.model.as_str(),
        prompt.text.as_str(),
        config.user_instruction.as_str(),
        file_id.as_str(),
    );

    // ── Step 6–7: Call the model, read the completion ───────────────────
    stage(ProcessStage::CallingModel);
    log.append(&format!("Calling model {}", choice.model)).await;
    let call_start = Instant::now();
    let completion = client.respond(&request).await?;
    info!(
        "Model answered in {}ms ({} chars)",
        call_start.elapsed().as_millis(),
        completion.text.len()
    );
    log.append(&format!(
        "Raw response (truncated): {}",
        excerpt(&completion.raw.to_string(), config.log_excerpt_chars)
    ))
    .await;

    // ── Step 8: Extract and validate ────────────────────────────────────
    stage(ProcessStage::ExtractingJson);
    let doc = extract::extract(&completion.text)?;
    let strategy = doc.strategy();
    let element_count = doc.element_count();
    log.append(&format!(
        "JSON located by strategy '{strategy}', {element_count} Matriz element(s)"
    ))
    .await;

    // ── Step 9: Normalise and persist ───────────────────────────────────
    stage(ProcessStage::SavingResult);
    let canonical_json = normalize::normalize(&doc.into_value())
        .map_err(|e| Pdf2MatrizError::Internal(format!("Failed to serialise result: {e}")))?;
    storage::write_artifact(&artifacts.result, &canonical_json).await?;
    log.append(&format!(
        "Processing completed, result saved to {}",
        artifacts.result.display()
    ))
    .await;
    info!(
        "Processed {} in {}ms",
        artifacts.document.display(),
        start.elapsed().as_millis()
    );

    Ok(ProcessOutput {
        canonical_json,
        element_count,
        file_id,
        model: choice.model,
        strategy,
        result_path: artifacts.result.clone(),
        prompt,
    })
}

/// At most `max_chars` characters of `text`, with `...` when cut.
fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Read the stored result of a previously processed document, if any.
pub async fn load_result(document: &Path) -> Option<String> {
    let path = ArtifactPaths::for_document(document).result;
    tokio::fs::read_to_string(&path).await.ok()
}
