// Conversational LaTeX agent: mode detection, ask/edit flows and their HTTP handlers.
// All model calls go through llm_client; all document checks go through pipeline.

pub mod chat;
pub mod handlers;
pub mod mode;
pub mod prompts;

pub use chat::{Agent, ChatInput, ChatReply};
