//! Structural Validator: runs a fixed battery of independent checks and emits typed
//! defect tags.
//!
//! Every check runs unconditionally. `is_valid` is derived from the error list only;
//! warnings never block compilation.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::latex::analyzer::{extract_packages, extract_sections};

pub const DOCUMENTCLASS: &str = "\\documentclass";
pub const BEGIN_DOCUMENT: &str = "\\begin{document}";
pub const END_DOCUMENT: &str = "\\end{document}";

pub const COLOR_PACKAGE: &str = "xcolor";
pub const HYPERLINK_PACKAGE: &str = "hyperref";

/// Section names a resume is expected to carry at least one of (case-insensitive).
pub const CANONICAL_SECTIONS: &[&str] = &["experience", "education", "skills", "projects"];

lazy_static! {
    static ref ENVIRONMENT_RE: Regex =
        Regex::new(r"\\(begin|end)\{([A-Za-z@]+\*?)\}").unwrap();
    static ref COLOR_COMMAND_RE: Regex = Regex::new(r"\\(?:textcolor|color)").unwrap();
    static ref HYPERLINK_COMMAND_RE: Regex = Regex::new(r"\\(?:href|url)").unwrap();
}

/// A classified structural problem. Each tag maps to at most one repair action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DefectTag {
    MissingDocumentclass,
    MissingBeginDocument,
    MissingEndDocument,
    /// `delta` is opening minus closing braces.
    UnbalancedBraces { delta: i64 },
    UnclosedEnvironment { name: String },
    MissingPackage { name: String },
    MissingStandardSection,
}

impl fmt::Display for DefectTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefectTag::MissingDocumentclass => write!(f, "Missing \\documentclass declaration"),
            DefectTag::MissingBeginDocument => write!(f, "Missing \\begin{{document}}"),
            DefectTag::MissingEndDocument => write!(f, "Missing \\end{{document}}"),
            DefectTag::UnbalancedBraces { delta } if *delta > 0 => {
                write!(f, "Unbalanced braces: {delta} more opening than closing")
            }
            DefectTag::UnbalancedBraces { delta } => {
                write!(f, "Unbalanced braces: {} more closing than opening", -delta)
            }
            DefectTag::UnclosedEnvironment { name } => write!(f, "Unclosed environment: {name}"),
            DefectTag::MissingPackage { name } if name == COLOR_PACKAGE => {
                write!(f, "Using color commands without {name} package")
            }
            DefectTag::MissingPackage { name } if name == HYPERLINK_PACKAGE => {
                write!(f, "Using hyperlinks without {name} package")
            }
            DefectTag::MissingPackage { name } => write!(f, "Missing package: {name}"),
            DefectTag::MissingStandardSection => write!(
                f,
                "No standard resume section found (expected one of: {})",
                CANONICAL_SECTIONS.join(", ")
            ),
        }
    }
}

/// Result of one validation call. Never mutated; a new report replaces the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<DefectTag>,
    pub warnings: Vec<DefectTag>,
    pub is_valid: bool,
}

impl ValidationReport {
    pub fn new(errors: Vec<DefectTag>, warnings: Vec<DefectTag>) -> Self {
        let is_valid = errors.is_empty();
        Self {
            errors,
            warnings,
            is_valid,
        }
    }

    /// Errors first, then warnings, the order the repairer consults them in.
    pub fn tags(&self) -> impl Iterator<Item = &DefectTag> {
        self.errors.iter().chain(self.warnings.iter())
    }

    pub fn has(&self, tag: &DefectTag) -> bool {
        self.tags().any(|t| t == tag)
    }

    /// Human-readable rendering used as LLM retry diagnostics.
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        if !self.errors.is_empty() {
            lines.push("Errors found:".to_string());
            lines.extend(self.errors.iter().map(|e| format!("  - {e}")));
        }
        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            lines.extend(self.warnings.iter().map(|w| format!("  - {w}")));
        }
        if lines.is_empty() {
            lines.push("LaTeX structure looks good.".to_string());
        }
        lines.join("\n")
    }
}

pub fn validate(document: &str) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if !document.contains(DOCUMENTCLASS) {
        errors.push(DefectTag::MissingDocumentclass);
    }
    if !document.contains(BEGIN_DOCUMENT) {
        errors.push(DefectTag::MissingBeginDocument);
    }
    if !document.contains(END_DOCUMENT) {
        errors.push(DefectTag::MissingEndDocument);
    }

    let delta = brace_delta(document);
    if delta != 0 {
        errors.push(DefectTag::UnbalancedBraces { delta });
    }

    errors.extend(
        unclosed_environments(document)
            .into_iter()
            .map(|name| DefectTag::UnclosedEnvironment { name }),
    );

    let packages = extract_packages(document);
    let has_color_package = packages.contains(COLOR_PACKAGE) || packages.contains("color");
    if COLOR_COMMAND_RE.is_match(document) && !has_color_package {
        warnings.push(DefectTag::MissingPackage {
            name: COLOR_PACKAGE.to_string(),
        });
    }
    if HYPERLINK_COMMAND_RE.is_match(document) && !packages.contains(HYPERLINK_PACKAGE) {
        warnings.push(DefectTag::MissingPackage {
            name: HYPERLINK_PACKAGE.to_string(),
        });
    }

    let has_standard_section = extract_sections(document).iter().any(|s| {
        let name = s.name.to_lowercase();
        CANONICAL_SECTIONS.iter().any(|c| name.contains(c))
    });
    if !has_standard_section {
        warnings.push(DefectTag::MissingStandardSection);
    }

    ValidationReport::new(errors, warnings)
}

/// Opening minus closing braces, ignoring escaped braces (`\{`, `\}`) and `%` comments.
pub fn brace_delta(document: &str) -> i64 {
    let mut delta = 0i64;
    let mut chars = document.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '%' => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        break;
                    }
                }
            }
            '{' => delta += 1,
            '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

/// Environments opened without a later matching close, in the order opened.
/// `document` is excluded: its markers carry their own tags.
pub fn unclosed_environments(document: &str) -> Vec<String> {
    let mut open: Vec<String> = Vec::new();

    for cap in ENVIRONMENT_RE.captures_iter(document) {
        let name = &cap[2];
        if name == "document" {
            continue;
        }
        if &cap[1] == "begin" {
            open.push(name.to_string());
        } else if let Some(idx) = open.iter().rposition(|n| n == name) {
            open.remove(idx);
        }
    }

    open
}
