//! Document Structure Analyzer: extracts packages, sections and a cursor-centred
//! excerpt from a LaTeX source.
//!
//! Pure and infallible: a document with no recognisable structure yields empty results.

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Lines on either side of the cursor included in `context_excerpt`.
pub const CONTEXT_RADIUS: usize = 20;

lazy_static! {
    static ref PACKAGE_RE: Regex = Regex::new(r"\\usepackage(?:\[[^\]]*\])?\{([^}]+)\}").unwrap();
    static ref SECTION_RE: Regex =
        Regex::new(r"(?m)^[ \t]*\\(?:section|resumeSection)\*?\{([^}]+)\}").unwrap();
}

/// Editor cursor as sent by the front-end. Lines are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub line: usize,
    #[serde(default)]
    pub column: Option<usize>,
}

/// A section heading and the zero-based line it starts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionEntry {
    pub name: String,
    pub line: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentInsights {
    pub packages: BTreeSet<String>,
    pub sections: Vec<SectionEntry>,
    pub current_section: Option<String>,
    pub context_excerpt: String,
}

impl DocumentInsights {
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.name.as_str())
    }

    /// Multi-line summary handed to the LLM as document context.
    pub fn summary(&self) -> String {
        let packages = if self.packages.is_empty() {
            "None".to_string()
        } else {
            self.packages.iter().cloned().collect::<Vec<_>>().join(", ")
        };
        let sections = if self.sections.is_empty() {
            "None".to_string()
        } else {
            self.section_names().collect::<Vec<_>>().join(", ")
        };

        format!(
            "Current section: {}\nDetected packages: {}\nSections: {}\nContext snippet:\n{}",
            self.current_section.as_deref().unwrap_or("Unknown"),
            packages,
            sections,
            self.context_excerpt
        )
        .trim()
        .to_string()
    }
}

pub fn analyze(document: &str, cursor: Option<CursorPosition>) -> DocumentInsights {
    let sections = extract_sections(document);
    let cursor_line = cursor.map(|c| c.line);

    DocumentInsights {
        packages: extract_packages(document),
        current_section: find_current_section(&sections, cursor_line),
        sections,
        context_excerpt: extract_context(document, cursor_line, CONTEXT_RADIUS),
    }
}

/// Flattens `\usepackage[opts]{a, b}` declarations into one set of names.
pub fn extract_packages(document: &str) -> BTreeSet<String> {
    PACKAGE_RE
        .captures_iter(document)
        .flat_map(|cap| {
            cap[1]
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
        })
        .collect()
}

pub fn extract_sections(document: &str) -> Vec<SectionEntry> {
    SECTION_RE
        .captures_iter(document)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let line = document[..whole.start()].matches('\n').count();
            Some(SectionEntry {
                name: cap[1].trim().to_string(),
                line,
            })
        })
        .collect()
}

/// Last section starting at or before the cursor; first section when there is no cursor.
fn find_current_section(sections: &[SectionEntry], cursor_line: Option<usize>) -> Option<String> {
    match cursor_line {
        None => sections.first().map(|s| s.name.clone()),
        Some(line) => sections
            .iter()
            .take_while(|s| s.line <= line)
            .last()
            .map(|s| s.name.clone()),
    }
}

fn extract_context(document: &str, cursor_line: Option<usize>, radius: usize) -> String {
    let lines: Vec<&str> = document.lines().collect();
    if lines.is_empty() {
        return String::new();
    }

    let centre = cursor_line.unwrap_or(0).min(lines.len() - 1);
    let start = centre.saturating_sub(radius);
    let end = (centre + radius + 1).min(lines.len());

    lines[start..end].join("\n")
}
