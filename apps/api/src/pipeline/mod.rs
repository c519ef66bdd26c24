//! Retry Orchestrator: validate → repair → revalidate → compile for one candidate document.
//!
//! Flow: validate → (repair → revalidate)* bounded by `max_repair_attempts` → compile
//! (only when valid, unless `compile_on_exhaustion`) → verdict.
//!
//! Each call owns its `CycleState` value from start to finish. Nothing here is shared
//! between concurrent requests except the compiler handle, whose backends allocate a
//! fresh scratch space per compile.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::compiler::{CompilationOutcome, Compiler};
use crate::config::Config;
use crate::latex::{repair, validate, ValidationReport};

/// Extra time granted past the backend's own timeout before the orchestrator gives up.
const COMPILE_GRACE: Duration = Duration::from_secs(5);

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// Working state of one orchestration cycle. Passed by value between stages.
#[derive(Debug, Clone)]
pub struct CycleState {
    pub document: String,
    /// Repair passes that produced at least one fix.
    pub iteration_count: u32,
    /// Every fix applied so far, in application order.
    pub repairs_applied: Vec<String>,
    pub last_validation: ValidationReport,
    pub last_compilation: Option<CompilationOutcome>,
}

impl CycleState {
    pub fn start(document: String) -> Self {
        let last_validation = validate(&document);
        Self {
            document,
            iteration_count: 0,
            repairs_applied: Vec::new(),
            last_validation,
            last_compilation: None,
        }
    }
}

/// Why the repair loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStop {
    Valid,
    /// A pass produced zero fixes.
    Stalled,
    /// The pass budget ran out.
    BudgetSpent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Empty input; nothing was validated or compiled.
    NoContent,
    /// Compiled successfully.
    Accepted,
    /// Compilation was attempted and failed.
    Failed,
    /// Still invalid when the repair budget ran out; not compiled.
    Exhausted,
    /// Repairs stopped making progress on a still-invalid document; not compiled.
    Unrepairable,
}

/// Result of `Pipeline::process`, surfaced to callers as-is.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    pub final_document: Option<String>,
    pub valid: bool,
    pub repairs_applied: Vec<String>,
    pub repair_passes: u32,
    pub compiled: bool,
    pub compile_outcome: Option<CompilationOutcome>,
    pub validation: Option<ValidationReport>,
    pub verdict: Verdict,
}

impl ProcessOutcome {
    fn no_content() -> Self {
        Self {
            final_document: None,
            valid: false,
            repairs_applied: Vec::new(),
            repair_passes: 0,
            compiled: false,
            compile_outcome: None,
            validation: None,
            verdict: Verdict::NoContent,
        }
    }

    /// Feedback for the next LLM attempt, or `None` when there is nothing to fix.
    pub fn retry_diagnostics(&self) -> Option<String> {
        if let Some(outcome) = self.compile_outcome.as_ref().filter(|o| !o.is_success()) {
            return Some(outcome.diagnostics());
        }
        match (&self.validation, self.verdict) {
            (Some(report), Verdict::Exhausted | Verdict::Unrepairable) => Some(format!(
                "The document is structurally invalid and was not compiled.\n{}",
                report.render()
            )),
            (None, Verdict::NoContent) => Some("No LaTeX document was produced.".to_string()),
            _ => None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Repair loop
// ────────────────────────────────────────────────────────────────────────────

/// Runs repair passes until the document is valid, a pass makes no progress, or
/// `max_attempts` passes have run. Each pass is followed by a fresh validation.
pub fn run_repair_loop(mut state: CycleState, max_attempts: u32) -> (CycleState, RepairStop) {
    loop {
        if state.last_validation.is_valid {
            return (state, RepairStop::Valid);
        }
        if state.iteration_count >= max_attempts {
            return (state, RepairStop::BudgetSpent);
        }

        let outcome = repair(&state.document, &state.last_validation);
        if !outcome.made_progress() {
            debug!(
                errors = state.last_validation.errors.len(),
                "repair pass made no progress"
            );
            return (state, RepairStop::Stalled);
        }

        state.iteration_count += 1;
        debug!(
            pass = state.iteration_count,
            fixes = ?outcome.applied_fixes,
            "applied repair pass"
        );
        state.repairs_applied.extend(outcome.applied_fixes);
        state.document = outcome.document;
        state.last_validation = validate(&state.document);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub max_repair_attempts: u32,
    pub compile_on_exhaustion: bool,
    pub compile_timeout: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_repair_attempts: config.max_repair_attempts,
            compile_on_exhaustion: config.compile_on_exhaustion,
            compile_timeout: config.latex_api_timeout + COMPILE_GRACE,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_repair_attempts: 2,
            compile_on_exhaustion: false,
            compile_timeout: Duration::from_secs(30) + COMPILE_GRACE,
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    compiler: Arc<dyn Compiler>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(compiler: Arc<dyn Compiler>, settings: PipelineSettings) -> Self {
        Self { compiler, settings }
    }

    /// Processes one candidate document end to end.
    pub async fn process(&self, document: &str) -> ProcessOutcome {
        if document.trim().is_empty() {
            info!("empty document, skipping validation and compile");
            return ProcessOutcome::no_content();
        }

        let (mut state, stop) = run_repair_loop(
            CycleState::start(document.to_string()),
            self.settings.max_repair_attempts,
        );

        let valid = state.last_validation.is_valid;
        info!(
            valid,
            passes = state.iteration_count,
            fixes = state.repairs_applied.len(),
            ?stop,
            "validation finished"
        );

        if valid || self.settings.compile_on_exhaustion {
            state.last_compilation = Some(self.compile(&state.document).await);
        } else {
            warn!(
                errors = ?state.last_validation.errors,
                "document still invalid after repairs, not compiling"
            );
        }

        let compiled = state
            .last_compilation
            .as_ref()
            .is_some_and(CompilationOutcome::is_success);

        let verdict = match (&state.last_compilation, stop) {
            (Some(_), _) if compiled => Verdict::Accepted,
            (Some(_), _) => Verdict::Failed,
            (None, RepairStop::Stalled) => Verdict::Unrepairable,
            (None, _) => Verdict::Exhausted,
        };

        ProcessOutcome {
            final_document: Some(state.document),
            valid,
            repairs_applied: state.repairs_applied,
            repair_passes: state.iteration_count,
            compiled,
            compile_outcome: state.last_compilation,
            validation: Some(state.last_validation),
            verdict,
        }
    }

    /// Compiles `document` directly, bounded by the configured timeout.
    pub async fn compile(&self, document: &str) -> CompilationOutcome {
        let backend = self.compiler.name();
        match tokio::time::timeout(self.settings.compile_timeout, self.compiler.compile(document))
            .await
        {
            Ok(outcome) => {
                info!(backend, status = ?outcome.status, "compile finished");
                outcome
            }
            Err(_) => {
                warn!(backend, "compile timed out");
                CompilationOutcome::transport_failure(format!(
                    "Compilation via {backend} timed out after {}s",
                    self.settings.compile_timeout.as_secs()
                ))
            }
        }
    }
}
