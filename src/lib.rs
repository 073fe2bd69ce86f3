//! # pdf2matriz
//!
//! Upload a PDF, have an LLM analyse it, recover a `{"Matriz": [...]}` JSON
//! object from the free-text answer, and show the result as HTML tables.
//!
//! ## Why this crate?
//!
//! Asking a model for "a single JSON object" does not mean getting one.
//! Answers arrive fenced in Markdown, wrapped in a friendly paragraph, or
//! as bare JSON. This crate recovers the object deterministically, checks
//! the one thing the rest of the workflow depends on (a `Matriz` array),
//! stores a canonical copy next to the document, and renders any of the
//! JSON shapes the visualiser accepts into a uniform list of tables.
//!
//! ## Workflow Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Upload    store under <root>/<sanitised stem>/, hand back a receipt
//!  ├─ 2. Confirm   the client sends the receipt back with prompt + model
//!  ├─ 3. LLM       Files upload + Responses call (OpenAI-compatible API)
//!  ├─ 4. Extract   fenced block → whole response → Matriz pattern
//!  ├─ 5. Persist   canonical JSON to <file>.result.json, log to process.log
//!  └─ 6. Render    JSON → [{title, markup}] tables (independent request)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pdf2matriz::{process_document, OpenAiClient, ProcessConfig, PromptCatalog, RequestContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProcessConfig::builder()
//!         .storage_root("storage")
//!         .api_key(std::env::var("OPENAI_API_KEY")?)
//!         .build()?;
//!     let client = OpenAiClient::new(&config)?;
//!     let ctx = RequestContext::new("storage/ficha/ficha.pdf");
//!     let output = process_document(&ctx, &config, &client, &PromptCatalog::builtin()).await?;
//!     println!("{}", output.canonical_json);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum HTTP front doors ([`server`]) |
//! | `cli`    | on      | Enables the `pdf2matriz` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable both when using only the library:
//! ```toml
//! pdf2matriz = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ModelChoice, ModelPolicy, ProcessConfig, ProcessConfigBuilder};
pub use error::{ExtractionError, Pdf2MatrizError, RemoteCallError, RenderError};
pub use pipeline::extract::{extract, ExtractedDocument, StrategyKind};
pub use pipeline::llm::{KeyStatus, LlmClient, OpenAiClient};
pub use pipeline::normalize::normalize;
pub use pipeline::storage::{FileStore, LocalFileStore};
pub use pipeline::tables::{render, render_html, render_str, DisplayTable};
pub use process::{
    process_document, upload_document, ProcessOutput, RequestContext, UploadReceipt,
    UploadRequest,
};
pub use progress::{NoopProgressCallback, ProcessProgressCallback, ProcessStage, ProgressCallback};
pub use prompts::{PromptCatalog, PromptEntry, ResolvedPrompt};
pub use workflow::WorkflowState;
