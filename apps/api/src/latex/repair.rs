//! Deterministic Repairer: applies fixed, ordered textual patches for known defect tags.
//!
//! Detection lives in `validator`; this module only consumes tags. Each tag maps to at
//! most one `RepairAction` via `action_for`, and actions always run in priority order.
//! Repairs never re-validate: callers must re-run `validate` after every pass.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::latex::analyzer::extract_packages;
use crate::latex::validator::{
    brace_delta, unclosed_environments, DefectTag, ValidationReport, BEGIN_DOCUMENT,
    COLOR_PACKAGE, DOCUMENTCLASS, END_DOCUMENT, HYPERLINK_PACKAGE,
};

/// Prepended when a document has no `\documentclass`.
pub const MINIMAL_PREAMBLE: &str = "\\documentclass[11pt]{article}\n\
\\usepackage[margin=0.8in]{geometry}\n\
\\usepackage[hidelinks]{hyperref}\n\
\\usepackage{xcolor}\n\
\\usepackage{enumitem}\n\
\\setlist[itemize]{leftmargin=*,itemsep=2pt,topsep=2pt}\n\
\\pagestyle{empty}\n";

lazy_static! {
    static ref PREAMBLE_DECLARATION_RE: Regex =
        Regex::new(r"(?m)^\\(?:documentclass|usepackage).*$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairOutcome {
    pub document: String,
    /// Fix descriptions in application order. Empty means no automatic progress is possible.
    pub applied_fixes: Vec<String>,
}

impl RepairOutcome {
    pub fn made_progress(&self) -> bool {
        !self.applied_fixes.is_empty()
    }
}

/// Corrective actions, declared in the order they are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairAction {
    PrependPreamble,
    InsertDocumentMarkers,
    CloseBraces,
    AddPackage { name: String },
    CloseEnvironments,
}

impl RepairAction {
    fn priority(&self) -> u8 {
        match self {
            RepairAction::PrependPreamble => 0,
            RepairAction::InsertDocumentMarkers => 1,
            RepairAction::CloseBraces => 2,
            RepairAction::AddPackage { name } if name == COLOR_PACKAGE => 3,
            RepairAction::AddPackage { name } if name == HYPERLINK_PACKAGE => 4,
            RepairAction::AddPackage { .. } => 5,
            RepairAction::CloseEnvironments => 6,
        }
    }
}

/// The tag → action lookup table.
pub fn action_for(tag: &DefectTag) -> Option<RepairAction> {
    match tag {
        DefectTag::MissingDocumentclass => Some(RepairAction::PrependPreamble),
        DefectTag::MissingBeginDocument | DefectTag::MissingEndDocument => {
            Some(RepairAction::InsertDocumentMarkers)
        }
        DefectTag::UnbalancedBraces { delta } if *delta > 0 => Some(RepairAction::CloseBraces),
        // Surplus closing braces would need deletions; repair is append-only.
        DefectTag::UnbalancedBraces { .. } => None,
        DefectTag::UnclosedEnvironment { .. } => Some(RepairAction::CloseEnvironments),
        DefectTag::MissingPackage { name } => Some(RepairAction::AddPackage { name: name.clone() }),
        DefectTag::MissingStandardSection => None,
    }
}

/// Runs one repair pass over `document` for the tags in `report`.
pub fn repair(document: &str, report: &ValidationReport) -> RepairOutcome {
    let mut actions: Vec<RepairAction> = report.tags().filter_map(action_for).collect();
    actions.sort_by_key(RepairAction::priority);
    actions.dedup();

    // A document missing its class and its markers gets one wrapper fix, not two.
    let wrap = actions.contains(&RepairAction::PrependPreamble)
        && actions.contains(&RepairAction::InsertDocumentMarkers);

    let mut text = document.to_string();
    let mut applied_fixes = Vec::new();

    for action in &actions {
        match action {
            RepairAction::PrependPreamble if wrap => applied_fixes.extend(wrap_document(&mut text)),
            RepairAction::InsertDocumentMarkers if wrap => {}
            _ => applied_fixes.extend(apply(action, &mut text, report)),
        }
    }

    RepairOutcome {
        document: text,
        applied_fixes,
    }
}

fn apply(action: &RepairAction, text: &mut String, report: &ValidationReport) -> Vec<String> {
    match action {
        RepairAction::PrependPreamble => prepend_preamble(text).into_iter().collect(),
        RepairAction::InsertDocumentMarkers => {
            let had_class = !report.has(&DefectTag::MissingDocumentclass);
            insert_document_markers(text, had_class).into_iter().collect()
        }
        RepairAction::CloseBraces => close_braces(text).into_iter().collect(),
        RepairAction::AddPackage { name } => add_package(text, name).into_iter().collect(),
        RepairAction::CloseEnvironments => close_environments(text),
    }
}

fn prepend_preamble(text: &mut String) -> Option<String> {
    if text.contains(DOCUMENTCLASS) {
        return None;
    }
    let separator = if text.starts_with('\n') { "" } else { "\n" };
    *text = format!("{MINIMAL_PREAMBLE}{separator}{text}");
    Some("Added minimal preamble".to_string())
}

/// Minimal preamble plus document markers around the existing content.
fn wrap_document(text: &mut String) -> Option<String> {
    let prepended = prepend_preamble(text).is_some();
    let marked = insert_document_markers(text, false).is_some();
    (prepended || marked).then(|| "Added minimal wrapper".to_string())
}

/// `had_class` is whether the document carried a `\documentclass` before this pass.
/// A pre-existing preamble with no markers gets an empty body appended; otherwise the
/// missing markers are placed around the existing content.
fn insert_document_markers(text: &mut String, had_class: bool) -> Option<String> {
    let missing_begin = !text.contains(BEGIN_DOCUMENT);
    let missing_end = !text.contains(END_DOCUMENT);

    if had_class && missing_begin && missing_end {
        text.push_str("\n\\begin{document}\n\n\\end{document}\n");
        return Some("Added \\begin{document} and \\end{document}".to_string());
    }

    if missing_begin {
        let insert_at = PREAMBLE_DECLARATION_RE
            .find_iter(text)
            .last()
            .map(|m| m.end())
            .unwrap_or(0);
        text.insert_str(insert_at, "\n\\begin{document}\n");
    }
    if missing_end {
        text.push_str("\n\\end{document}\n");
    }

    match (missing_begin, missing_end) {
        (true, true) => Some("Added \\begin{document} and \\end{document}".to_string()),
        (true, false) => Some("Added \\begin{document}".to_string()),
        (false, true) => Some("Added \\end{document}".to_string()),
        (false, false) => None,
    }
}

/// Appends the missing closing braces. When the last line ends in a `%` comment they
/// go in front of the comment instead, so they are not commented out.
fn close_braces(text: &mut String) -> Option<String> {
    let delta = brace_delta(text);
    if delta <= 0 {
        return None;
    }
    let closers = "}".repeat(delta as usize);
    match trailing_comment_start(text) {
        Some(at) => text.insert_str(at, &closers),
        None => text.push_str(&closers),
    }
    Some(format!("Balanced {delta} brace(s)"))
}

/// Byte offset of the unescaped `%` opening a comment on the last line, if any.
fn trailing_comment_start(text: &str) -> Option<usize> {
    let line_start = text.rfind('\n').map_or(0, |i| i + 1);
    let mut chars = text[line_start..].char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '%' => return Some(line_start + i),
            _ => {}
        }
    }
    None
}

fn package_declaration(name: &str) -> String {
    if name == HYPERLINK_PACKAGE {
        format!("\\usepackage[hidelinks]{{{name}}}")
    } else {
        format!("\\usepackage{{{name}}}")
    }
}

/// Inserts the package right after the `\documentclass` line. Skipped when the package is
/// already declared in any bracketed-option form, or when there is no class line yet.
fn add_package(text: &mut String, name: &str) -> Option<String> {
    if extract_packages(text).contains(name) {
        return None;
    }
    let class_at = text.find(DOCUMENTCLASS)?;
    let declaration = package_declaration(name);

    match text[class_at..].find('\n') {
        Some(offset) => {
            let insert_at = class_at + offset + 1;
            text.insert_str(insert_at, &format!("{declaration}\n"));
        }
        None => {
            text.push('\n');
            text.push_str(&declaration);
        }
    }
    Some(format!("Added {name}"))
}

/// Closes every unmatched environment at the end of the document body (before
/// `\end{document}` when present). Innermost first, so nested closers stay properly paired.
fn close_environments(text: &mut String) -> Vec<String> {
    let mut unclosed = unclosed_environments(text);
    if unclosed.is_empty() {
        return Vec::new();
    }
    unclosed.reverse();

    let closers: String = unclosed
        .iter()
        .map(|name| format!("\\end{{{name}}}\n"))
        .collect();

    match text.rfind(END_DOCUMENT) {
        Some(end_at) => {
            let prefix = if text[..end_at].ends_with('\n') { "" } else { "\n" };
            text.insert_str(end_at, &format!("{prefix}{closers}"));
        }
        None => {
            text.push('\n');
            text.push_str(&closers);
        }
    }

    unclosed.iter().map(|name| format!("Closed {name}")).collect()
}
