//! Storage: where uploaded documents and their artifacts live on disk.
//!
//! Every upload gets its own directory under the storage root, named after
//! the sanitised file stem. Next to the original file the processing step
//! writes:
//!
//! ```text
//! <root>/<stem>/
//!   <file>               original upload
//!   <file>.file_id       provider handle of the uploaded copy
//!   <file>.result.json   canonical JSON result
//!   process.log          append-only, timestamped progress lines
//! ```
//!
//! Two uploads whose names sanitise to the same stem share a directory and
//! the later one overwrites the earlier one's artifacts. There is no
//! locking.
//!
//! The path handed to the client after an upload comes back on the
//! confirmation request, so it is untrusted input: [`resolve_within_root`]
//! canonicalises it and refuses anything outside the storage root.

use crate::error::Pdf2MatrizError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Suffix of the file holding the provider's file id.
pub const FILE_ID_SUFFIX: &str = ".file_id";

/// Suffix of the canonical JSON result.
pub const RESULT_SUFFIX: &str = ".result.json";

/// Name of the per-directory progress log.
pub const PROCESS_LOG_NAME: &str = "process.log";

/// Persists uploaded bytes and hands back where they landed.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Directory every saved file lives under.
    fn root(&self) -> &Path;

    /// Save `bytes` as `name` and return the stored path.
    async fn save(&self, bytes: &[u8], name: &str) -> Result<PathBuf, Pdf2MatrizError>;
}

/// [`FileStore`] on the local file system.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn save(&self, bytes: &[u8], name: &str) -> Result<PathBuf, Pdf2MatrizError> {
        let file_name = base_name(name);
        let dir = self.root.join(sanitize_dir_name(&file_name));
        let path = dir.join(&file_name);

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Pdf2MatrizError::UploadFailed {
                path: path.clone(),
                source: e,
            })?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Pdf2MatrizError::UploadFailed {
                path: path.clone(),
                source: e,
            })?;

        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(path)
    }
}

/// Last path component of a client-supplied file name.
///
/// Both separators are stripped because browsers on Windows may send a
/// full `C:\...` path.
pub fn base_name(name: &str) -> String {
    let last = name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(name)
        .trim();
    match last {
        "" | "." | ".." => "upload.pdf".to_string(),
        other => other.to_string(),
    }
}

/// Directory name for an upload: the file stem with every character
/// outside `[A-Za-z0-9._-]` replaced by `_`.
pub fn sanitize_dir_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// Resolve a client-supplied path, accepting it only if it is an existing
/// file inside `root`.
pub async fn resolve_within_root(
    root: &Path,
    candidate: &str,
) -> Result<PathBuf, Pdf2MatrizError> {
    let real_root = tokio::fs::canonicalize(root)
        .await
        .map_err(|e| Pdf2MatrizError::Internal(format!("storage root '{}': {e}", root.display())))?;

    let real_path = match tokio::fs::canonicalize(candidate).await {
        Ok(p) => p,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Pdf2MatrizError::FileNotFound {
                path: candidate.to_string(),
            })
        }
        Err(_) => {
            return Err(Pdf2MatrizError::PathTraversal {
                path: candidate.to_string(),
            })
        }
    };

    if !real_path.starts_with(&real_root) {
        warn!("Rejected path outside storage root: {}", candidate);
        return Err(Pdf2MatrizError::PathTraversal {
            path: candidate.to_string(),
        });
    }
    let is_file = tokio::fs::metadata(&real_path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(Pdf2MatrizError::FileNotFound {
            path: candidate.to_string(),
        });
    }
    Ok(real_path)
}

/// Paths of the artifacts belonging to one stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub document: PathBuf,
    pub file_id: PathBuf,
    pub result: PathBuf,
    pub log: PathBuf,
}

impl ArtifactPaths {
    pub fn for_document(document: &Path) -> Self {
        let dir = document.parent().unwrap_or_else(|| Path::new("."));
        Self {
            document: document.to_path_buf(),
            file_id: with_suffix(document, FILE_ID_SUFFIX),
            result: with_suffix(document, RESULT_SUFFIX),
            log: dir.join(PROCESS_LOG_NAME),
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// Write one artifact, replacing any previous version.
pub async fn write_artifact(path: &Path, contents: &str) -> Result<(), Pdf2MatrizError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| Pdf2MatrizError::ArtifactWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Append-only `process.log` of one document directory.
///
/// Lines look like `[2025-01-31 14:02:11] message`. Write failures are
/// reported through `tracing` and otherwise ignored: a full disk must not
/// turn a successful extraction into a failed one.
#[derive(Debug, Clone)]
pub struct ProcessLog {
    path: PathBuf,
}

impl ProcessLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, message: &str) {
        let line = format_log_line(&chrono::Local::now(), message);
        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = result {
            warn!("Failed to append to {}: {}", self.path.display(), e);
        }
    }
}

fn format_log_line<Tz>(at: &chrono::DateTime<Tz>, message: &str) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("[{}] {}\n", at.format("%Y-%m-%d %H:%M:%S"), message)
}
