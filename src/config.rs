//! Configuration types for the upload-and-extract workflow.
//!
//! Every knob of a processing run lives in [`ProcessConfig`], built via its
//! [`ProcessConfigBuilder`]. The configuration is the only thing shared
//! between requests; everything request-specific travels in
//! [`crate::process::RequestContext`].

use crate::error::Pdf2MatrizError;
use crate::progress::ProgressCallback;
use crate::prompts::DEFAULT_USER_INSTRUCTION;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default OpenAI-compatible API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// The only model the Responses workflow currently accepts.
pub const DEFAULT_MODEL: &str = "gpt-5.1";

/// Configuration for a processing run.
///
/// # Example
/// ```rust
/// use pdf2matriz::{ModelPolicy, ProcessConfig};
///
/// let config = ProcessConfig::builder()
///     .storage_root("/var/lib/pdf2matriz")
///     .api_key("sk-test")
///     .model_policy(ModelPolicy::new("gpt-5.1", ["gpt-5.1", "gpt-5.1-mini"]))
///     .build()
///     .unwrap();
/// assert_eq!(config.model_policy.default_model, "gpt-5.1");
/// ```
#[derive(Clone)]
pub struct ProcessConfig {
    /// Base URL of the OpenAI-compatible API. Default: [`DEFAULT_API_BASE_URL`].
    ///
    /// Tests point this at a local mock server.
    pub api_base_url: String,

    /// Bearer token for the provider. Read from `OPENAI_API_KEY` by the CLI.
    pub api_key: Option<String>,

    /// Directory under which every uploaded document gets its own folder.
    /// Default: `storage`.
    ///
    /// Follow-up requests are only allowed to touch files that canonicalise
    /// inside this directory.
    pub storage_root: PathBuf,

    /// Which models may be requested and what others are coerced to.
    pub model_policy: ModelPolicy,

    /// User-turn text sent alongside the attached PDF.
    pub user_instruction: String,

    /// `purpose` field of the file upload. Default: `user_data`.
    pub file_purpose: String,

    /// Optional timeout for each provider call, in seconds. Default: none.
    ///
    /// Without it a hung provider blocks the request until the connection
    /// drops.
    pub api_timeout_secs: Option<u64>,

    /// Maximum characters of the raw provider response copied into
    /// `process.log`. Default: 500.
    pub log_excerpt_chars: usize,

    /// Optional progress callback fired once per processing stage.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: None,
            storage_root: PathBuf::from("storage"),
            model_policy: ModelPolicy::default(),
            user_instruction: DEFAULT_USER_INSTRUCTION.to_string(),
            file_purpose: "user_data".to_string(),
            api_timeout_secs: None,
            log_excerpt_chars: 500,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ProcessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("storage_root", &self.storage_root)
            .field("model_policy", &self.model_policy)
            .field("file_purpose", &self.file_purpose)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("log_excerpt_chars", &self.log_excerpt_chars)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ProcessProgressCallback>"),
            )
            .finish()
    }
}

impl ProcessConfig {
    /// Create a new builder for `ProcessConfig`.
    pub fn builder() -> ProcessConfigBuilder {
        ProcessConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ProcessConfig`].
#[derive(Debug)]
pub struct ProcessConfigBuilder {
    config: ProcessConfig,
}

impl ProcessConfigBuilder {
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.storage_root = root.into();
        self
    }

    pub fn model_policy(mut self, policy: ModelPolicy) -> Self {
        self.config.model_policy = policy;
        self
    }

    pub fn user_instruction(mut self, text: impl Into<String>) -> Self {
        self.config.user_instruction = text.into();
        self
    }

    pub fn file_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.config.file_purpose = purpose.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn log_excerpt_chars(mut self, n: usize) -> Self {
        self.config.log_excerpt_chars = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessConfig, Pdf2MatrizError> {
        let c = &self.config;
        if c.api_base_url.is_empty() {
            return Err(Pdf2MatrizError::InvalidConfig(
                "API base URL must not be empty".into(),
            ));
        }
        if c.model_policy.allowed_models.is_empty() {
            return Err(Pdf2MatrizError::InvalidConfig(
                "At least one allowed model is required".into(),
            ));
        }
        if c.storage_root.as_os_str().is_empty() {
            return Err(Pdf2MatrizError::InvalidConfig(
                "Storage root must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Model policy ─────────────────────────────────────────────────────────

/// Which models a request may ask for.
///
/// A request that names no model gets `default_model`. A request naming a
/// model outside `allowed_models` is not rejected: it is coerced to the
/// first allowed model and the coercion is logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPolicy {
    pub default_model: String,
    pub allowed_models: Vec<String>,
}

impl Default for ModelPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL, [DEFAULT_MODEL])
    }
}

/// Outcome of [`ModelPolicy::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChoice {
    /// The model that will be sent to the provider.
    pub model: String,
    /// Set when the requested model was replaced.
    pub coerced_from: Option<String>,
}

impl ModelPolicy {
    pub fn new<I, S>(default_model: impl Into<String>, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            default_model: default_model.into(),
            allowed_models: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_allowed(&self, model: &str) -> bool {
        self.allowed_models.iter().any(|m| m == model)
    }

    /// Pick the model for a request.
    pub fn resolve(&self, requested: Option<&str>) -> ModelChoice {
        let requested = requested
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model);

        if self.is_allowed(requested) {
            return ModelChoice {
                model: requested.to_string(),
                coerced_from: None,
            };
        }

        // The default wins when allowed; otherwise the first allowed model.
        let fallback = if self.is_allowed(&self.default_model) {
            self.default_model.clone()
        } else {
            self.allowed_models
                .first()
                .cloned()
                .unwrap_or_else(|| self.default_model.clone())
        };
        ModelChoice {
            model: fallback,
            coerced_from: Some(requested.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let config = ProcessConfig::builder().build().unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.file_purpose, "user_data");
        assert_eq!(config.api_timeout_secs, None);
        assert_eq!(config.model_policy.default_model, DEFAULT_MODEL);
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let config = ProcessConfig::builder()
            .api_base_url("http://127.0.0.1:9000/v1/")
            .build()
            .unwrap();
        assert_eq!(config.api_base_url, "http://127.0.0.1:9000/v1");
    }

    #[test]
    fn empty_allowed_models_rejected() {
        let policy = ModelPolicy::new("x", Vec::<String>::new());
        let err = ProcessConfig::builder().model_policy(policy).build().unwrap_err();
        assert!(matches!(err, Pdf2MatrizError::InvalidConfig(_)));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = ProcessConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn allowed_model_is_kept() {
        let policy = ModelPolicy::new("gpt-5.1", ["gpt-5.1", "gpt-5.1-mini"]);
        let choice = policy.resolve(Some("gpt-5.1-mini"));
        assert_eq!(choice.model, "gpt-5.1-mini");
        assert_eq!(choice.coerced_from, None);
    }

    #[test]
    fn unknown_model_is_coerced() {
        let policy = ModelPolicy::default();
        let choice = policy.resolve(Some("gpt-4o"));
        assert_eq!(choice.model, DEFAULT_MODEL);
        assert_eq!(choice.coerced_from.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn missing_model_uses_default() {
        let policy = ModelPolicy::default();
        assert_eq!(policy.resolve(None).model, DEFAULT_MODEL);
        assert_eq!(policy.resolve(Some("  ")).model, DEFAULT_MODEL);
        assert_eq!(policy.resolve(None).coerced_from, None);
    }

    #[test]
    fn default_outside_allowed_is_coerced_too() {
        let policy = ModelPolicy::new("gpt-4.1", ["gpt-5.1"]);
        let choice = policy.resolve(None);
        assert_eq!(choice.model, "gpt-5.1");
        assert_eq!(choice.coerced_from.as_deref(), Some("gpt-4.1"));
    }

    #[test]
    fn disallowed_model_coerced_to_default_not_first() {
        let policy = ModelPolicy::new("gpt-5.1", ["gpt-5.1-mini", "gpt-5.1"]);
        let choice = policy.resolve(Some("gpt-4o"));
        assert_eq!(choice.model, "gpt-5.1");
        assert_eq!(choice.coerced_from.as_deref(), Some("gpt-4o"));
    }
}
