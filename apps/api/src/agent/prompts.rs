// Prompt text for the chat agent. Kept short on purpose; tone is not tuned here.

pub const ASK_SYSTEM: &str = "You are a LaTeX expert mentor helping someone write their resume. \
    Explain concepts clearly, reference the provided document context when helpful, \
    and include short code examples inside ```latex blocks when relevant.";

pub const EDIT_SYSTEM: &str = "You are a LaTeX code editor for resumes. \
    Produce updated LaTeX that fully replaces the existing document. \
    Keep every required package and the overall document structure.";

/// Appended to the user turn of every edit request.
pub const EDIT_INSTRUCTIONS: &str = "Always return the full LaTeX document between ```latex fences, \
    including \\documentclass, \\begin{document} and \\end{document}.\n\
    Respond with a short explanation first, then the code block.";

pub const DIAGNOSTICS_PREFIX: &str =
    "The previous attempt failed. Use these diagnostics to fix the LaTeX before returning.";

/// Added to the explanation when the completeness gate rejected the reply.
pub const KEPT_DOCUMENT_NOTE: &str =
    "(LLM response did not include a full LaTeX document; using existing document.)";

/// Used as the whole explanation when the reply had no prose and no usable document.
pub const MISSING_DOCUMENT_NOTE: &str =
    "LLM response missing a complete LaTeX document; using existing content.";

/// Characters of the held document shown to the model in ask mode.
pub const ASK_DOCUMENT_LIMIT: usize = 4000;

pub fn ask_context(context: &str, document: &str) -> String {
    let snippet: String = document.chars().take(ASK_DOCUMENT_LIMIT).collect();
    format!("Document context:\n{context}\n---\nCurrent document snippet:\n```latex\n{snippet}\n```")
}

pub fn edit_context(context: &str) -> String {
    format!("Context summary:\n{context}")
}

pub fn diagnostics(detail: &str) -> String {
    format!("{DIAGNOSTICS_PREFIX}\n{detail}")
}

pub fn edit_request(document: &str, request: &str) -> String {
    format!("Current document:\n```latex\n{document}\n```\n\nInstructions: {request}\n\n{EDIT_INSTRUCTIONS}")
}
