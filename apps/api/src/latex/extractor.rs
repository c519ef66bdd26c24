//! Response Extractor: splits raw LLM output into prose and an embedded document.
//!
//! The completeness gate rejects fenced blocks that are not full replacement documents,
//! so a model that answers with only the changed fragment cannot clobber the held state.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::latex::validator::{BEGIN_DOCUMENT, DOCUMENTCLASS, END_DOCUMENT};

lazy_static! {
    static ref CODE_BLOCK_RE: Regex = Regex::new(r"(?s)```(?:latex|tex)?[ \t]*\r?\n(.*?)\r?\n[ \t]*```").unwrap();
    static ref SECTION_COMMAND_RE: Regex = Regex::new(r"\\(?:sub)*section\*?\{").unwrap();
}

/// Raw split of an LLM reply: prose outside the fence, and the fenced block (if any).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitResponse {
    pub explanation: String,
    pub document: Option<String>,
}

/// Why a fenced block was refused by the completeness gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// Looks like an edited section rather than a whole document.
    SectionSnippet,
    /// Missing one of the three structural markers.
    IncompleteDocument,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedResponse {
    pub explanation: String,
    pub document: Option<String>,
    pub rejection: Option<Rejection>,
}

pub fn split(raw: &str) -> SplitResponse {
    let Some(cap) = CODE_BLOCK_RE.captures(raw) else {
        return SplitResponse {
            explanation: strip_fences(raw),
            document: None,
        };
    };

    let (Some(whole), Some(code)) = (cap.get(0), cap.get(1)) else {
        return SplitResponse {
            explanation: strip_fences(raw),
            document: None,
        };
    };

    let outside = format!("{}{}", &raw[..whole.start()], &raw[whole.end()..]);
    let code = code.as_str().trim();

    SplitResponse {
        explanation: strip_fences(&outside),
        document: (!code.is_empty()).then(|| code.to_string()),
    }
}

/// Splits a reply meant to replace the held document, applying the completeness gate.
pub fn extract_replacement(raw: &str) -> ExtractedResponse {
    let SplitResponse {
        explanation,
        document,
    } = split(raw);

    match document {
        Some(candidate) => match completeness_gate(&candidate) {
            Ok(()) => ExtractedResponse {
                explanation,
                document: Some(candidate),
                rejection: None,
            },
            Err(rejection) => ExtractedResponse {
                explanation,
                document: None,
                rejection: Some(rejection),
            },
        },
        None => ExtractedResponse {
            explanation,
            document: None,
            rejection: None,
        },
    }
}

/// Accepts only documents carrying all of `\documentclass`, `\begin{document}` and
/// `\end{document}`.
pub fn completeness_gate(candidate: &str) -> Result<(), Rejection> {
    let complete = [DOCUMENTCLASS, BEGIN_DOCUMENT, END_DOCUMENT]
        .iter()
        .all(|marker| candidate.contains(marker));

    if complete {
        Ok(())
    } else if SECTION_COMMAND_RE.is_match(candidate) {
        Err(Rejection::SectionSnippet)
    } else {
        Err(Rejection::IncompleteDocument)
    }
}

/// Pulls a document the user pasted into their message: a fenced block, or bare text
/// that already contains a class declaration and a begin marker.
pub fn extract_from_message(message: &str) -> Option<String> {
    if let Some(document) = split(message).document {
        return Some(document);
    }
    if message.contains(DOCUMENTCLASS) && message.contains(BEGIN_DOCUMENT) {
        return Some(message.trim().to_string());
    }
    None
}

fn strip_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "\\documentclass{article}\n\\begin{document}\nHi\n\\end{document}";

    #[test]
    fn test_split_separates_prose_and_code() {
        let raw = format!("Here is your resume.\n\n```latex\n{FULL}\n```\n\nLet me know!");
        let split = split(&raw);
        assert_eq!(split.document.as_deref(), Some(FULL));
        assert_eq!(split.explanation, "Here is your resume.\n\n\n\nLet me know!");
    }

    #[test]
    fn test_split_accepts_untagged_fence() {
        let raw = format!("```\n{FULL}\n```");
        let split = split(&raw);
        assert_eq!(split.document.as_deref(), Some(FULL));
        assert!(split.explanation.is_empty());
    }

    #[test]
    fn test_split_without_fence_is_all_explanation() {
        let split = split("  Just an answer.  ");
        assert_eq!(split.explanation, "Just an answer.");
        assert!(split.document.is_none());
    }

    #[test]
    fn test_stray_fences_are_removed_from_explanation() {
        let raw = format!("Intro\n```latex\n{FULL}\n```\nOutro\n```");
        assert_eq!(split(&raw).explanation, "Intro\n\nOutro");
    }

    #[test]
    fn test_section_only_snippet_is_rejected() {
        let raw = "Updated skills:\n```latex\n\\section{Skills}\nRust, Go\n```";
        let extracted = extract_replacement(raw);
        assert_eq!(extracted.document, None);
        assert_eq!(extracted.rejection, Some(Rejection::SectionSnippet));
        assert_eq!(extracted.explanation, "Updated skills:");
    }

    #[test]
    fn test_fragment_without_end_marker_is_rejected() {
        let raw = "```latex\n\\documentclass{article}\n\\begin{document}\nHi\n```";
        let extracted = extract_replacement(raw);
        assert_eq!(extracted.document, None);
        assert_eq!(extracted.rejection, Some(Rejection::IncompleteDocument));
    }

    #[test]
    fn test_complete_document_passes_gate() {
        let raw = format!("Done.\n```tex\n{FULL}\n```");
        let extracted = extract_replacement(&raw);
        assert_eq!(extracted.document.as_deref(), Some(FULL));
        assert_eq!(extracted.rejection, None);
    }

    #[test]
    fn test_extract_from_message_bare_document() {
        let message = format!("Please fix this:\n{FULL}");
        assert_eq!(extract_from_message(&message), Some(message.trim().to_string()));
        assert_eq!(extract_from_message("add a skills section"), None);
    }
}
