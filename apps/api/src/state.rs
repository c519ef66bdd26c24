use std::sync::Arc;

use crate::agent::Agent;
use crate::compiler::Compiler;
use crate::config::Config;
use crate::llm_client::LanguageModel;
use crate::pipeline::{Pipeline, PipelineSettings};

/// Shared application state injected into all route handlers via Axum extractors.
/// Holds only immutable configuration and collaborator handles; no per-request state.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Agent>,
    /// Used directly by `/compile-latex`; the agent holds its own clone.
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(
        config: &Config,
        llm: Arc<dyn LanguageModel>,
        compiler: Arc<dyn Compiler>,
    ) -> Self {
        Self::with_settings(
            llm,
            compiler,
            PipelineSettings::from_config(config),
            config.max_iterations,
        )
    }

    pub fn with_settings(
        llm: Arc<dyn LanguageModel>,
        compiler: Arc<dyn Compiler>,
        settings: PipelineSettings,
        max_iterations: u32,
    ) -> Self {
        let pipeline = Pipeline::new(compiler, settings);
        Self {
            agent: Arc::new(Agent::new(llm, pipeline.clone(), max_iterations)),
            pipeline,
        }
    }
}
