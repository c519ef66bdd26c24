//! Chat agent: routes one user message through the ask or edit flow.
//!
//! Ask: context → LLM → explanation. No document change.
//! Edit: context → LLM → extractor (completeness gate) → pipeline → accept on a
//!       successful compile, otherwise retry the LLM with diagnostics while
//!       iterations remain.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::agent::mode::{detect_mode, AgentMode};
use crate::agent::prompts;
use crate::latex::extractor::{extract_from_message, extract_replacement, split};
use crate::latex::formatter::format_latex;
use crate::latex::{analyze, CursorPosition};
use crate::llm_client::{ChatMessage, LanguageModel, LlmError};
use crate::pipeline::{Pipeline, ProcessOutcome};

/// One incoming chat request, already stripped of transport details.
#[derive(Debug, Clone, Default)]
pub struct ChatInput {
    pub message: String,
    /// Prior turns, oldest first. System messages are not expected here.
    pub history: Vec<ChatMessage>,
    /// The document the user currently holds, possibly empty.
    pub document: String,
    pub mode: Option<String>,
    pub cursor: Option<CursorPosition>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub mode: AgentMode,
    pub explanation: String,
    /// The replacement document (edit mode only).
    pub document: Option<String>,
    /// Result of the last orchestration cycle (edit mode only).
    pub outcome: Option<ProcessOutcome>,
    pub iterations: u32,
    pub success: bool,
}

#[derive(Clone)]
pub struct Agent {
    llm: Arc<dyn LanguageModel>,
    pipeline: Pipeline,
    max_iterations: u32,
}

impl Agent {
    pub fn new(llm: Arc<dyn LanguageModel>, pipeline: Pipeline, max_iterations: u32) -> Self {
        Self {
            llm,
            pipeline,
            max_iterations: max_iterations.max(1),
        }
    }

    pub async fn respond(&self, input: ChatInput) -> Result<ChatReply, LlmError> {
        let mode = detect_mode(&input.message, input.mode.as_deref());

        // A document pasted into the message replaces the held one.
        let document = extract_from_message(&input.message).unwrap_or(input.document);
        let context = analyze(&document, input.cursor).summary();

        info!(?mode, document_len = document.len(), "handling chat message");

        match mode {
            AgentMode::Ask => {
                self.ask(&context, &document, &input.history, &input.message)
                    .await
            }
            AgentMode::Edit => {
                self.edit(&context, document, &input.history, &input.message)
                    .await
            }
        }
    }

    async fn ask(
        &self,
        context: &str,
        document: &str,
        history: &[ChatMessage],
        request: &str,
    ) -> Result<ChatReply, LlmError> {
        let mut messages = vec![
            ChatMessage::system(prompts::ASK_SYSTEM),
            ChatMessage::system(prompts::ask_context(context, document)),
        ];
        messages.extend(conversation(history));
        messages.push(ChatMessage::user(request));

        let raw = self.llm.complete(&messages).await?;
        let explanation = split(&raw).explanation;

        Ok(ChatReply {
            mode: AgentMode::Ask,
            explanation: if explanation.is_empty() { raw } else { explanation },
            document: None,
            outcome: None,
            iterations: 1,
            success: true,
        })
    }

    async fn edit(
        &self,
        context: &str,
        held: String,
        history: &[ChatMessage],
        request: &str,
    ) -> Result<ChatReply, LlmError> {
        let mut diagnostics: Option<String> = None;
        let mut last: Option<(String, String, ProcessOutcome)> = None;

        for iteration in 1..=self.max_iterations {
            let mut messages = vec![
                ChatMessage::system(prompts::EDIT_SYSTEM),
                ChatMessage::system(prompts::edit_context(context)),
            ];
            if let Some(detail) = diagnostics.as_deref() {
                messages.push(ChatMessage::system(prompts::diagnostics(detail)));
            }
            messages.extend(conversation(history));
            messages.push(ChatMessage::user(prompts::edit_request(&held, request)));

            let raw = self.llm.complete(&messages).await?;
            let extracted = extract_replacement(&raw);

            let (candidate, explanation) = match extracted.document {
                Some(document) => (document, extracted.explanation),
                None => {
                    warn!(
                        iteration,
                        rejection = ?extracted.rejection,
                        "LLM reply had no complete document, keeping held document"
                    );
                    let explanation = if extracted.explanation.is_empty() {
                        prompts::MISSING_DOCUMENT_NOTE.to_string()
                    } else {
                        format!("{}\n\n{}", extracted.explanation, prompts::KEPT_DOCUMENT_NOTE)
                    };
                    (held.clone(), explanation)
                }
            };

            let outcome = self.pipeline.process(&candidate).await;
            info!(
                iteration,
                verdict = ?outcome.verdict,
                repairs = outcome.repairs_applied.len(),
                "edit iteration finished"
            );

            if outcome.compiled {
                let document = outcome
                    .final_document
                    .as_deref()
                    .map(format_latex)
                    .unwrap_or_default();
                return Ok(ChatReply {
                    mode: AgentMode::Edit,
                    explanation,
                    document: Some(document),
                    outcome: Some(outcome),
                    iterations: iteration,
                    success: true,
                });
            }

            diagnostics = outcome.retry_diagnostics();
            let document = outcome.final_document.clone().unwrap_or(candidate);
            last = Some((explanation, document, outcome));
        }

        warn!(
            max_iterations = self.max_iterations,
            "edit attempts exhausted without a successful compile"
        );

        let (explanation, document, outcome) = match last {
            Some((explanation, document, outcome)) => (explanation, Some(document), Some(outcome)),
            None => (prompts::MISSING_DOCUMENT_NOTE.to_string(), None, None),
        };

        Ok(ChatReply {
            mode: AgentMode::Edit,
            explanation,
            document: document.filter(|d| !d.trim().is_empty()),
            outcome,
            iterations: self.max_iterations,
            success: false,
        })
    }
}

/// Prior turns forwarded to the model; empty turns and stray system entries are dropped.
fn conversation(history: &[ChatMessage]) -> impl Iterator<Item = ChatMessage> + '_ {
    history
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .filter(|m| m.role != crate::llm_client::Role::System)
        .cloned()
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::llm_client::Role;
    use crate::pipeline::tests::FakeCompiler;
    use crate::pipeline::{PipelineSettings, Verdict};

    /// Replays canned replies in order and records every message list it was given.
    #[derive(Default)]
    pub(crate) struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        pub calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        pub(crate) fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::default(),
            }
        }

        pub(crate) fn replying(replies: &[&str]) -> Self {
            Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
        }

        fn call(&self, index: usize) -> Vec<ChatMessage> {
            self.calls.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
            self.calls.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyContent))
        }
    }

    const HELD: &str = "\\documentclass{article}\n\\begin{document}\n\\section{Experience}\nEngineer\n\\end{document}";

    fn fenced(document: &str) -> String {
        format!("Updated the resume.\n\n```latex\n{document}\n```")
    }

    fn agent(model: Arc<ScriptedModel>, max_iterations: u32) -> Agent {
        let pipeline = Pipeline::new(Arc::new(FakeCompiler::default()), PipelineSettings::default());
        Agent::new(model, pipeline, max_iterations)
    }

    fn edit_input(message: &str) -> ChatInput {
        ChatInput {
            message: message.to_string(),
            document: HELD.to_string(),
            mode: Some("edit".to_string()),
            ..ChatInput::default()
        }
    }

    #[tokio::test]
    async fn test_ask_returns_explanation_only() {
        let model = Arc::new(ScriptedModel::replying(&[
            "Use \\hfill.\n```latex\n\\hfill\n```",
        ]));
        let long_document = format!("{HELD}\n{}", "%filler\n".repeat(700));
        let input = ChatInput {
            message: "How do I right-align dates?".to_string(),
            history: vec![ChatMessage::user("hi"), ChatMessage::assistant("")],
            document: long_document,
            ..ChatInput::default()
        };

        let reply = agent(model.clone(), 3).respond(input).await.unwrap();

        assert_eq!(reply.mode, AgentMode::Ask);
        assert_eq!(reply.explanation, "Use \\hfill.");
        assert!(reply.document.is_none());

        let messages = model.call(0);
        assert_eq!(messages.len(), 4);
        assert!(messages[1].content.starts_with("Document context:\nCurrent section: Experience"));
        assert!(!messages[1].content.contains(&"%filler\n".repeat(600)));
        assert_eq!(messages[2], ChatMessage::user("hi"));
        assert_eq!(messages[3].content, "How do I right-align dates?");
    }

    #[tokio::test]
    async fn test_edit_accepts_first_compiling_document() {
        let updated = HELD.replace("Engineer", "Engineer\n\\section{Skills}\nRust");
        let model = Arc::new(ScriptedModel::replying(&[&fenced(&updated)]));

        let reply = agent(model.clone(), 3)
            .respond(edit_input("add a skills section"))
            .await
            .unwrap();

        assert!(reply.success);
        assert_eq!(reply.iterations, 1);
        assert_eq!(reply.explanation, "Updated the resume.");
        let document = reply.document.unwrap();
        assert!(document.contains("\\section{Skills}"));
        assert_eq!(reply.outcome.unwrap().verdict, Verdict::Accepted);

        let messages = model.call(0);
        assert_eq!(messages[0].content, prompts::EDIT_SYSTEM);
        assert!(messages.last().unwrap().content.contains(HELD));
    }

    #[tokio::test]
    async fn test_edit_retries_with_compiler_diagnostics() {
        let broken = HELD.replace("Engineer", "\\fail");
        let model = Arc::new(ScriptedModel::replying(&[&fenced(&broken), &fenced(HELD)]));

        let reply = agent(model.clone(), 3)
            .respond(edit_input("change my title"))
            .await
            .unwrap();

        assert!(reply.success);
        assert_eq!(reply.iterations, 2);

        let first = model.call(0);
        assert!(!first.iter().any(|m| m.content.starts_with(prompts::DIAGNOSTICS_PREFIX)));

        let second = model.call(1);
        let diagnostics = second
            .iter()
            .find(|m| m.content.starts_with(prompts::DIAGNOSTICS_PREFIX))
            .expect("diagnostics message");
        assert_eq!(diagnostics.role, Role::System);
        assert!(diagnostics.content.contains("! Undefined control sequence."));
        // The LLM keeps editing the held document, not its failed attempt.
        assert!(second.last().unwrap().content.contains("Engineer"));
    }

    #[tokio::test]
    async fn test_snippet_reply_keeps_held_document() {
        let model = Arc::new(ScriptedModel::replying(&[
            "Here is the new section.\n```latex\n\\section{Skills}\nRust, Go\n```",
        ]));

        let reply = agent(model, 3)
            .respond(edit_input("add skills"))
            .await
            .unwrap();

        assert!(reply.success);
        assert_eq!(
            reply.explanation,
            format!("Here is the new section.\n\n{}", prompts::KEPT_DOCUMENT_NOTE)
        );
        assert!(reply.document.unwrap().contains("Engineer"));
    }

    #[tokio::test]
    async fn test_edit_gives_up_after_max_iterations() {
        let broken = fenced(&HELD.replace("Engineer", "\\fail"));
        let model = Arc::new(ScriptedModel::replying(&[&broken, &broken]));

        let reply = agent(model.clone(), 2)
            .respond(edit_input("fix the layout"))
            .await
            .unwrap();

        assert!(!reply.success);
        assert_eq!(reply.iterations, 2);
        assert_eq!(model.calls.lock().unwrap().len(), 2);
        assert_eq!(reply.outcome.unwrap().verdict, Verdict::Failed);
        assert!(reply.document.unwrap().contains("\\fail"));
    }

    #[tokio::test]
    async fn test_llm_failure_is_surfaced() {
        let model = Arc::new(ScriptedModel::new(vec![Err(LlmError::Timeout { secs: 120 })]));

        let result = agent(model, 3).respond(edit_input("update dates")).await;

        assert!(matches!(result, Err(LlmError::Timeout { secs: 120 })));
    }

    #[tokio::test]
    async fn test_pasted_document_becomes_held() {
        let pasted = HELD.replace("Engineer", "Pasted role");
        let model = Arc::new(ScriptedModel::replying(&["No changes needed."]));
        let input = ChatInput {
            message: format!("Please fix this:\n```latex\n{pasted}\n```"),
            document: String::new(),
            ..ChatInput::default()
        };

        let reply = agent(model.clone(), 1).respond(input).await.unwrap();

        assert_eq!(reply.mode, AgentMode::Edit);
        assert!(model.call(0).last().unwrap().content.contains("Pasted role"));
        assert_eq!(
            reply.explanation,
            format!("No changes needed.\n\n{}", prompts::KEPT_DOCUMENT_NOTE)
        );
        assert!(reply.document.unwrap().contains("Pasted role"));
    }
}
