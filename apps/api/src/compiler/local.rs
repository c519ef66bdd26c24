//! Local backend: runs `pdflatex` directly, one fresh temporary directory per attempt.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::compiler::{store_pdf, CompilationOutcome, Compiler};

const SOURCE_NAME: &str = "document.tex";
const LOG_NAME: &str = "document.log";
const PDF_NAME: &str = "document.pdf";

#[derive(Debug, Clone)]
pub struct LocalCompiler {
    program: String,
    timeout: Duration,
    output_dir: PathBuf,
}

impl LocalCompiler {
    pub fn new(program: &str, timeout: Duration, output_dir: PathBuf) -> Self {
        Self {
            program: program.to_string(),
            timeout,
            output_dir,
        }
    }
}

#[async_trait]
impl Compiler for LocalCompiler {
    async fn compile(&self, document: &str) -> CompilationOutcome {
        if document.trim().is_empty() {
            return CompilationOutcome::failure(
                "Empty document provided",
                vec!["Empty document".to_string()],
            );
        }

        // Dropped at the end of this call, removing the working directory.
        let workdir = match tempfile::Builder::new().prefix("resumeforge-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                return CompilationOutcome::transport_failure(format!(
                    "Failed to create compile directory: {e}"
                ))
            }
        };

        if let Err(e) = tokio::fs::write(workdir.path().join(SOURCE_NAME), document).await {
            return CompilationOutcome::transport_failure(format!(
                "Failed to write {SOURCE_NAME}: {e}"
            ));
        }

        let run = Command::new(&self.program)
            .arg("-interaction=nonstopmode")
            .arg("-halt-on-error")
            .arg(SOURCE_NAME)
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(program = %self.program, "failed to launch compiler: {e}");
                return CompilationOutcome::transport_failure(format!(
                    "Failed to run {}: {e}",
                    self.program
                ));
            }
            Err(_) => {
                return CompilationOutcome::transport_failure(format!(
                    "{} timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                ))
            }
        };

        let log = match tokio::fs::read_to_string(workdir.path().join(LOG_NAME)).await {
            Ok(log) => log,
            Err(_) => String::from_utf8_lossy(&output.stdout).into_owned(),
        };

        let pdf = tokio::fs::read(workdir.path().join(PDF_NAME)).await.ok();
        debug!(status = %output.status, has_pdf = pdf.is_some(), "local compile finished");

        match pdf {
            Some(pdf) if output.status.success() => {
                match store_pdf(&self.output_dir, Bytes::from(pdf)).await {
                    Ok(path) => CompilationOutcome::success(log, Some(path)),
                    Err(e) => CompilationOutcome::failure(
                        log,
                        vec![format!("Failed to store compiled PDF: {e}")],
                    ),
                }
            }
            _ => CompilationOutcome::failure(
                log,
                vec![format!("{} exited with {}", self.program, output.status)],
            ),
        }
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use super::*;
    use crate::compiler::CompileStatus;

    /// Writes an executable shell script standing in for pdflatex.
    fn fake_program(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_successful_run_stores_pdf() {
        let bin = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let program = fake_program(
            bin.path(),
            "ok-latex",
            "echo '%PDF-1.4 local' > document.pdf\necho 'Output written on document.pdf' > document.log",
        );

        let outcome = LocalCompiler::new(&program, Duration::from_secs(10), out.path().to_path_buf())
            .compile("\\documentclass{article}")
            .await;

        assert_eq!(outcome.status, CompileStatus::Success);
        assert_eq!(outcome.log.trim(), "Output written on document.pdf");
        assert!(outcome.pdf_reference.unwrap().starts_with(out.path()));
    }

    #[tokio::test]
    async fn test_failed_run_reports_log_marker() {
        let bin = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let program = fake_program(
            bin.path(),
            "bad-latex",
            "printf '! Undefined control sequence.\\nl.5 \\\\foo\\n' > document.log\nexit 1",
        );

        let outcome = LocalCompiler::new(&program, Duration::from_secs(10), out.path().to_path_buf())
            .compile("\\documentclass{article}")
            .await;

        assert_eq!(outcome.status, CompileStatus::Error);
        assert!(outcome.error_summary[0].contains("exited with"));
        assert_eq!(outcome.error_summary[1], "! Undefined control sequence.");
        assert!(outcome.pdf_reference.is_none());
    }

    #[tokio::test]
    async fn test_missing_program_is_transport_failure() {
        let out = tempfile::tempdir().unwrap();
        let outcome = LocalCompiler::new(
            "definitely-not-a-latex-binary",
            Duration::from_secs(5),
            out.path().to_path_buf(),
        )
        .compile("\\documentclass{article}")
        .await;

        assert_eq!(outcome.error_summary.len(), 1);
        assert!(outcome.error_summary[0].starts_with("Failed to run"));
    }

    #[tokio::test]
    async fn test_slow_program_times_out() {
        let bin = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let program = fake_program(bin.path(), "slow-latex", "sleep 5");

        let outcome = LocalCompiler::new(&program, Duration::from_millis(200), out.path().to_path_buf())
            .compile("\\documentclass{article}")
            .await;

        assert!(outcome.error_summary[0].contains("timed out"));
    }
}
