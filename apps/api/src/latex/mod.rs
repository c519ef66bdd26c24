// LaTeX structure handling: analysis, validation, deterministic repair, LLM response
// extraction and formatting. Everything here is pure and synchronous.

pub mod analyzer;
pub mod extractor;
pub mod formatter;
pub mod repair;
pub mod validator;

pub use analyzer::{analyze, CursorPosition, DocumentInsights};
pub use repair::{repair, RepairOutcome};
pub use validator::{validate, DefectTag, ValidationReport};
