//! Progress-callback trait for processing-stage events.
//!
//! Inject an [`Arc<dyn ProcessProgressCallback>`] via
//! [`crate::config::ProcessConfigBuilder::progress_callback`] to be told
//! when each stage of a processing run starts. The CLI renders these as an
//! `indicatif` spinner; the HTTP server runs without one.
//!
//! The per-document `process.log` file is written regardless of any
//! callback; callbacks are for live feedback only.
//!
//! # Example
//!
//! ```rust
//! use pdf2matriz::{ProcessConfig, ProcessProgressCallback, ProcessStage};
//! use std::sync::{Arc, Mutex};
//!
//! struct StageRecorder {
//!     seen: Mutex<Vec<ProcessStage>>,
//! }
//!
//! impl ProcessProgressCallback for StageRecorder {
//!     fn on_stage(&self, stage: ProcessStage) {
//!         self.seen.lock().unwrap().push(stage);
//!     }
//! }
//!
//! let recorder = Arc::new(StageRecorder { seen: Mutex::new(Vec::new()) });
//! let config = ProcessConfig::builder()
//!     .progress_callback(recorder as Arc<dyn ProcessProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// A stage of the processing step, in the order the stages run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStage {
    /// Sending the document to the provider's file store.
    UploadingFile,
    /// Waiting on the Responses call.
    CallingModel,
    /// Running the strategy chain and schema validation.
    ExtractingJson,
    /// Writing the canonical result next to the document.
    SavingResult,
}

impl fmt::Display for ProcessStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProcessStage::UploadingFile => "uploading file",
            ProcessStage::CallingModel => "waiting for the model",
            ProcessStage::ExtractingJson => "extracting JSON",
            ProcessStage::SavingResult => "saving result",
        };
        f.write_str(label)
    }
}

/// Called by the processing step as it moves through its stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync` because the
/// configuration is shared by every request the server handles.
pub trait ProcessProgressCallback: Send + Sync {
    /// Called once before the first stage.
    fn on_process_start(&self, file_name: &str) {
        let _ = file_name;
    }

    /// Called when a stage begins.
    fn on_stage(&self, stage: ProcessStage) {
        let _ = stage;
    }

    /// Called once after the result has been persisted.
    ///
    /// * `element_count` — number of entries in `Matriz`
    fn on_process_complete(&self, element_count: usize) {
        let _ = element_count;
    }

    /// Called once when the run aborts.
    fn on_process_error(&self, error: &str) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ProcessProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ProcessConfig`].
pub type ProgressCallback = Arc<dyn ProcessProgressCallback>;
