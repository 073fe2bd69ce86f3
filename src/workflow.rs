//! Per-request workflow state.
//!
//! ```text
//! AwaitingUpload ──uploaded──▶ AwaitingConfirmation ──confirm──▶ Processing
//!        ▲                              ▲                            │
//!        │ restart                      │ retry            complete / fail
//!        │                              │                            ▼
//!        └──────────────── Failed ◀─────┴──────────────── Completed | Failed
//! ```
//!
//! `Completed` and `Failed` end a request. A failure keeps the upload
//! receipt when there is one, so the user can retry the confirmation step
//! without uploading the file again.
//!
//! The state is what the HTTP front doors answer with: it serialises as an
//! object tagged by `state`.

use crate::process::{ProcessOutput, UploadReceipt};
use serde::Serialize;
use thiserror::Error;

/// Where one request stands.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowState {
    #[default]
    AwaitingUpload,
    AwaitingConfirmation {
        receipt: UploadReceipt,
    },
    Processing {
        receipt: UploadReceipt,
    },
    Completed {
        receipt: UploadReceipt,
        output: ProcessOutput,
    },
    Failed {
        receipt: Option<UploadReceipt>,
        message: String,
    },
}

/// A transition that the current state does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} while {state}")]
pub struct TransitionError {
    pub state: &'static str,
    pub action: &'static str,
}

impl WorkflowState {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowState::AwaitingUpload => "awaiting_upload",
            WorkflowState::AwaitingConfirmation { .. } => "awaiting_confirmation",
            WorkflowState::Processing { .. } => "processing",
            WorkflowState::Completed { .. } => "completed",
            WorkflowState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Completed { .. } | WorkflowState::Failed { .. }
        )
    }

    /// The upload receipt carried by the state, if any.
    pub fn receipt(&self) -> Option<&UploadReceipt> {
        match self {
            WorkflowState::AwaitingUpload => None,
            WorkflowState::AwaitingConfirmation { receipt }
            | WorkflowState::Processing { receipt }
            | WorkflowState::Completed { receipt, .. } => Some(receipt),
            WorkflowState::Failed { receipt, .. } => receipt.as_ref(),
        }
    }

    fn refuse(&self, action: &'static str) -> TransitionError {
        TransitionError {
            state: self.name(),
            action,
        }
    }

    /// `AwaitingUpload → AwaitingConfirmation`.
    pub fn uploaded(self, receipt: UploadReceipt) -> Result<Self, TransitionError> {
        match self {
            WorkflowState::AwaitingUpload => Ok(WorkflowState::AwaitingConfirmation { receipt }),
            other => Err(other.refuse("accept an upload")),
        }
    }

    /// `AwaitingConfirmation → Processing`.
    pub fn confirm(self) -> Result<Self, TransitionError> {
        match self {
            WorkflowState::AwaitingConfirmation { receipt } => {
                Ok(WorkflowState::Processing { receipt })
            }
            other => Err(other.refuse("confirm")),
        }
    }

    /// `Processing → Completed`.
    pub fn complete(self, output: ProcessOutput) -> Result<Self, TransitionError> {
        match self {
            WorkflowState::Processing { receipt } => {
                Ok(WorkflowState::Completed { receipt, output })
            }
            other => Err(other.refuse("complete")),
        }
    }

    /// Any non-terminal state `→ Failed`, keeping the receipt.
    pub fn fail(self, message: impl Into<String>) -> Result<Self, TransitionError> {
        if self.is_terminal() {
            return Err(self.refuse("fail"));
        }
        let receipt = self.receipt().cloned();
        Ok(WorkflowState::Failed {
            receipt,
            message: message.into(),
        })
    }

    /// `Failed → AwaitingUpload`.
    pub fn restart(self) -> Result<Self, TransitionError> {
        match self {
            WorkflowState::Failed { .. } => Ok(WorkflowState::AwaitingUpload),
            other => Err(other.refuse("restart")),
        }
    }

    /// `Failed` with a receipt `→ AwaitingConfirmation`.
    pub fn retry(self) -> Result<Self, TransitionError> {
        match self {
            WorkflowState::Failed {
                receipt: Some(receipt),
                ..
            } => Ok(WorkflowState::AwaitingConfirmation { receipt }),
            other => Err(other.refuse("retry")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extract::StrategyKind;
    use crate::prompts::ResolvedPrompt;
    use std::path::PathBuf;

    fn receipt() -> UploadReceipt {
        UploadReceipt {
            path: PathBuf::from("/storage/doc/doc.pdf"),
            name: "doc.pdf".into(),
            prompt_key: None,
        }
    }

    fn output() -> ProcessOutput {
        ProcessOutput {
            canonical_json: "{\n    \"Matriz\": []\n}".into(),
            element_count: 0,
            file_id: "file-1".into(),
            model: "gpt-5.1".into(),
            strategy: StrategyKind::WholeResponse,
            result_path: PathBuf::from("/storage/doc/doc.pdf.result.json"),
            prompt: ResolvedPrompt {
                key: "k".into(),
                name: "K".into(),
                text: "t".into(),
                visualizer: "/visualize".into(),
            },
        }
    }

    #[test]
    fn happy_path() {
        let s = WorkflowState::default()
            .uploaded(receipt())
            .unwrap()
            .confirm()
            .unwrap()
            .complete(output())
            .unwrap();
        assert_eq!(s.name(), "completed");
        assert!(s.is_terminal());
        assert_eq!(s.receipt(), Some(&receipt()));
    }

    #[test]
    fn failure_keeps_receipt_and_allows_retry() {
        let failed = WorkflowState::default()
            .uploaded(receipt())
            .unwrap()
            .confirm()
            .unwrap()
            .fail("Processing error")
            .unwrap();
        assert_eq!(failed.receipt(), Some(&receipt()));

        let again = failed.clone().retry().unwrap();
        assert_eq!(again, WorkflowState::AwaitingConfirmation { receipt: receipt() });
        assert_eq!(failed.restart().unwrap(), WorkflowState::AwaitingUpload);
    }

    #[test]
    fn upload_failure_cannot_retry() {
        let failed = WorkflowState::AwaitingUpload.fail("Error saving").unwrap();
        assert_eq!(failed.receipt(), None);
        let err = failed.retry().unwrap_err();
        assert_eq!(err.action, "retry");
        assert_eq!(err.state, "failed");
    }

    #[test]
    fn terminal_states_reject_transitions() {
        let done = WorkflowState::Processing { receipt: receipt() }
            .complete(output())
            .unwrap();
        assert!(done.clone().fail("x").is_err());
        assert!(done.clone().confirm().is_err());
        assert!(done.restart().is_err());
    }

    #[test]
    fn skipping_confirmation_is_refused() {
        let err = WorkflowState::AwaitingUpload.confirm().unwrap_err();
        assert_eq!(err.to_string(), "cannot confirm while awaiting_upload");
        assert!(WorkflowState::AwaitingConfirmation { receipt: receipt() }
            .complete(output())
            .is_err());
    }

    #[test]
    fn serialises_with_state_tag() {
        let v = serde_json::to_value(WorkflowState::AwaitingConfirmation { receipt: receipt() })
            .unwrap();
        assert_eq!(v["state"], "awaiting_confirmation");
        assert_eq!(v["receipt"]["name"], "doc.pdf");

        let v = serde_json::to_value(WorkflowState::AwaitingUpload).unwrap();
        assert_eq!(v, serde_json::json!({"state": "awaiting_upload"}));
    }
}
