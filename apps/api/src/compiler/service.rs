//! HTTP backend for the `latex-api` compile service (`POST /compile`, multipart `file`).

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::compiler::{store_pdf, CompilationOutcome, Compiler};

pub const UNREACHABLE: &str = "Failed to reach latex-api service";

/// Error body shape returned by the service when no PDF was produced.
#[derive(Debug, Default, Deserialize)]
struct ServiceErrorBody {
    error: Option<String>,
    message: Option<String>,
    #[serde(rename = "logTail")]
    log_tail: Option<String>,
    log: Option<String>,
}

#[derive(Clone)]
pub struct ServiceCompiler {
    client: Client,
    base_url: String,
    output_dir: PathBuf,
}

impl ServiceCompiler {
    pub fn new(base_url: &str, timeout: Duration, output_dir: PathBuf) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            output_dir,
        })
    }

    fn compile_url(&self) -> String {
        format!("{}/compile", self.base_url)
    }
}

#[async_trait]
impl Compiler for ServiceCompiler {
    async fn compile(&self, document: &str) -> CompilationOutcome {
        if document.trim().is_empty() {
            return CompilationOutcome::failure(
                "Empty document provided",
                vec!["Empty document".to_string()],
            );
        }

        let part = match Part::bytes(document.as_bytes().to_vec())
            .file_name("document.tex")
            .mime_str("application/x-tex")
        {
            Ok(part) => part,
            Err(e) => return CompilationOutcome::transport_failure(format!("{UNREACHABLE}: {e}")),
        };

        let response = match self
            .client
            .post(self.compile_url())
            .multipart(Form::new().part("file", part))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("latex-api request failed: {e}");
                return CompilationOutcome::transport_failure(format!("{UNREACHABLE}: {e}"));
            }
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if status.is_success() && content_type.contains("application/pdf") {
            let pdf = match response.bytes().await {
                Ok(pdf) => pdf,
                Err(e) => {
                    return CompilationOutcome::transport_failure(format!(
                        "{UNREACHABLE}: failed reading PDF body: {e}"
                    ))
                }
            };
            debug!(bytes = pdf.len(), "latex-api returned PDF");

            return match store_pdf(&self.output_dir, pdf).await {
                Ok(path) => CompilationOutcome::success(
                    "Compiled successfully via latex-api service.",
                    Some(path),
                ),
                Err(e) => CompilationOutcome::failure(
                    format!("PDF produced but could not be stored: {e}"),
                    vec!["Failed to store compiled PDF".to_string()],
                ),
            };
        }

        let body = response.text().await.unwrap_or_default();
        let (log, errors) = parse_error_body(status.as_u16(), &body);
        CompilationOutcome::failure(log, errors)
    }

    fn name(&self) -> &'static str {
        "latex-api"
    }
}

/// Extracts `(log, errors)` from a non-PDF response. Falls back to the raw body and a
/// status line when the body is not the expected JSON.
fn parse_error_body(status: u16, body: &str) -> (String, Vec<String>) {
    let parsed: ServiceErrorBody = serde_json::from_str(body).unwrap_or_default();

    let errors = match parsed.error.or(parsed.message) {
        Some(summary) => vec![summary],
        None => vec![format!("latex-api responded with status {status}")],
    };
    let log = parsed.log_tail.or(parsed.log).unwrap_or_else(|| body.to_string());

    (log, errors)
}
