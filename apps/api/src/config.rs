use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Which compile backend the pipeline hands documents to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerBackend {
    /// The external `latex-api` HTTP service.
    Service,
    /// A `pdflatex` executable on this host.
    Local,
}

impl FromStr for CompilerBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "service" | "latex-api" => Ok(CompilerBackend::Service),
            "local" | "pdflatex" => Ok(CompilerBackend::Local),
            other => bail!("COMPILER_BACKEND must be 'service' or 'local', got '{other}'"),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or a numeric one is malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub llm_timeout: Duration,
    /// LLM-level edit attempts per chat request.
    pub max_iterations: u32,
    /// Repair passes per orchestration cycle.
    pub max_repair_attempts: u32,
    /// Compile documents that are still invalid once repairs are exhausted.
    pub compile_on_exhaustion: bool,
    pub compiler_backend: CompilerBackend,
    pub latex_api_url: String,
    pub latex_api_timeout: Duration,
    pub latex_compiler: String,
    pub latex_temp_dir: PathBuf,
    pub cors_allowed_origin: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            llm_model: env_or("LLM_MODEL", crate::llm_client::DEFAULT_MODEL),
            llm_temperature: parse_env("LLM_TEMPERATURE", 0.2)?,
            llm_timeout: Duration::from_secs(parse_env("LLM_TIMEOUT_SECS", 120)?),
            max_iterations: parse_env("AGENT_MAX_ITERATIONS", 3)?,
            max_repair_attempts: parse_env("MAX_REPAIR_ATTEMPTS", 2)?,
            compile_on_exhaustion: parse_env("COMPILE_ON_EXHAUSTION", false)?,
            compiler_backend: parse_env("COMPILER_BACKEND", CompilerBackend::Service)?,
            latex_api_url: env_or("LATEX_API_URL", "http://localhost:8000"),
            latex_api_timeout: Duration::from_secs(parse_env("LATEX_API_TIMEOUT_SECS", 30)?),
            latex_compiler: env_or("LATEX_COMPILER", "pdflatex"),
            latex_temp_dir: PathBuf::from(env_or("LATEX_TEMP_DIR", "/tmp/latex_compile")),
            cors_allowed_origin: env_or("CORS_ALLOWED_ORIGIN", "http://localhost:3000"),
            port: parse_env("PORT", 8001)?,
            rust_log: env_or("RUST_LOG", "info"),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parses `key` if set; a set-but-malformed value is an error, never a silent default.
fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} has invalid value '{raw}': {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiler_backend_parsing() {
        assert_eq!("service".parse::<CompilerBackend>().unwrap(), CompilerBackend::Service);
        assert_eq!(" LOCAL ".parse::<CompilerBackend>().unwrap(), CompilerBackend::Local);
        assert!("docker".parse::<CompilerBackend>().is_err());
    }

    #[test]
    fn test_parse_env_uses_default_when_unset() {
        let value: u32 = parse_env("RESUMEFORGE_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_parse_env_rejects_malformed_value() {
        std::env::set_var("RESUMEFORGE_TEST_BAD_NUMBER", "three");
        let result: Result<u32> = parse_env("RESUMEFORGE_TEST_BAD_NUMBER", 3);
        assert!(result.is_err());
        std::env::remove_var("RESUMEFORGE_TEST_BAD_NUMBER");
    }
}
