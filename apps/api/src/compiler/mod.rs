//! Compiler Adapter: hands a document to an external LaTeX toolchain and returns a
//! structured outcome.
//!
//! Backends never return `Err`: transport problems become a `status = error` outcome so
//! the caller always receives diagnostics. Each backend keeps its scratch space unique
//! per call, so concurrent requests never share a working directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{CompilerBackend, Config};

pub mod local;
pub mod service;

pub use local::LocalCompiler;
pub use service::ServiceCompiler;

/// Lines of the compiler log replayed to the LLM on retry.
const LOG_TAIL_LINES: usize = 10;

/// Substrings that mark a log line as an error, besides TeX's leading `!`.
const ERROR_MARKERS: &[&str] = &["LaTeX Error", "Fatal error", "Emergency stop"];

/// Stored PDFs kept in the output directory; older ones are pruned on each store.
const MAX_STORED_PDFS: usize = 200;

const PDF_PREFIX: &str = "resume_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompileStatus {
    Success,
    Error,
}

/// Immutable once returned by a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationOutcome {
    pub status: CompileStatus,
    pub log: String,
    /// Where the produced PDF was stored. Opaque to everything but the HTTP layer.
    pub pdf_reference: Option<PathBuf>,
    pub error_summary: Vec<String>,
    pub compiled_at: DateTime<Utc>,
}

impl CompilationOutcome {
    pub fn success(log: impl Into<String>, pdf_reference: Option<PathBuf>) -> Self {
        Self {
            status: CompileStatus::Success,
            log: log.into(),
            pdf_reference,
            error_summary: Vec::new(),
            compiled_at: Utc::now(),
        }
    }

    /// A compile that ran and failed. The first error-marker line of the log is added to
    /// `errors` when not already present.
    pub fn failure(log: impl Into<String>, errors: Vec<String>) -> Self {
        let log = log.into();
        let mut error_summary = errors;
        if let Some(line) = summarize_log(&log) {
            if !error_summary.contains(&line) {
                error_summary.push(line);
            }
        }
        Self {
            status: CompileStatus::Error,
            log,
            pdf_reference: None,
            error_summary,
            compiled_at: Utc::now(),
        }
    }

    /// The compiler could not be reached at all; `detail` is the sole error line.
    pub fn transport_failure(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self {
            status: CompileStatus::Error,
            log: detail.clone(),
            pdf_reference: None,
            error_summary: vec![detail],
            compiled_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CompileStatus::Success
    }

    /// Error lines plus the log tail, formatted for an LLM retry prompt.
    pub fn diagnostics(&self) -> String {
        let errors = if self.error_summary.is_empty() {
            "Compilation failed.".to_string()
        } else {
            self.error_summary.join("\n")
        };

        let lines: Vec<&str> = self.log.lines().collect();
        let tail = lines[lines.len().saturating_sub(LOG_TAIL_LINES)..].join("\n");

        if tail.trim().is_empty() {
            errors
        } else {
            format!("{errors}\n\nLog tail:\n{tail}")
        }
    }
}

/// First log line carrying a known LaTeX error marker.
pub fn summarize_log(log: &str) -> Option<String> {
    log.lines()
        .map(str::trim)
        .find(|line| line.starts_with('!') || ERROR_MARKERS.iter().any(|m| line.contains(m)))
        .map(str::to_string)
}

#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(&self, document: &str) -> CompilationOutcome;

    /// Backend label for logs and responses.
    fn name(&self) -> &'static str;
}

/// Builds the backend selected by `COMPILER_BACKEND`.
pub fn build_compiler(config: &Config) -> anyhow::Result<Arc<dyn Compiler>> {
    let compiler: Arc<dyn Compiler> = match config.compiler_backend {
        CompilerBackend::Service => Arc::new(ServiceCompiler::new(
            &config.latex_api_url,
            config.latex_api_timeout,
            config.latex_temp_dir.clone(),
        )?),
        CompilerBackend::Local => Arc::new(LocalCompiler::new(
            &config.latex_compiler,
            config.latex_api_timeout,
            config.latex_temp_dir.clone(),
        )),
    };
    Ok(compiler)
}

/// Persists a produced PDF under `dir` with a unique name, first pruning the directory
/// down to the newest `MAX_STORED_PDFS - 1` stored PDFs.
pub(crate) async fn store_pdf(dir: &Path, pdf: Bytes) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    match prune_stored_pdfs(dir, MAX_STORED_PDFS - 1).await {
        Ok(0) => {}
        Ok(removed) => debug!("Pruned {removed} stored PDF(s) from {}", dir.display()),
        Err(e) => warn!("Failed to prune stored PDFs in {}: {e}", dir.display()),
    }
    let path = dir.join(format!("{PDF_PREFIX}{}.pdf", Uuid::new_v4().simple()));
    tokio::fs::write(&path, &pdf).await?;
    Ok(path)
}

/// Deletes all but the `keep` most recently modified stored PDFs in `dir`. Other files
/// are left alone. Returns how many were removed.
async fn prune_stored_pdfs(dir: &Path, keep: usize) -> std::io::Result<usize> {
    let mut stored = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !(name.starts_with(PDF_PREFIX) && name.ends_with(".pdf")) {
            continue;
        }
        let modified = entry.metadata().await?.modified()?;
        stored.push((modified, entry.path()));
    }
    if stored.len() <= keep {
        return Ok(0);
    }

    stored.sort_by(|a, b| b.0.cmp(&a.0));
    let mut removed = 0;
    for (_, path) in stored.into_iter().skip(keep) {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            // Another request got there first.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(removed)
}
