//! Whitespace-only normaliser applied to accepted documents.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref BLANK_RUN_RE: Regex = Regex::new(r"\n{3,}").unwrap();
    static ref LIST_ENV_RE: Regex =
        Regex::new(r"(?s)\\begin\{(itemize|enumerate)\}(.*?)\\end\{(itemize|enumerate)\}").unwrap();
    static ref SECTION_SPACING_RE: Regex = Regex::new(r"([^\n])\n(\\section)").unwrap();
}

pub fn format_latex(content: &str) -> String {
    if content.trim().is_empty() {
        return content.to_string();
    }

    let text = content.replace("\r\n", "\n").replace('\r', "\n");
    let text = text
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let text = BLANK_RUN_RE.replace_all(&text, "\n\n");

    let text = LIST_ENV_RE.replace_all(&text, |caps: &Captures| {
        let (open, body, close) = (&caps[1], &caps[2], &caps[3]);
        // The regex crate has no backreferences; mismatched pairs are left untouched.
        if open != close {
            return caps[0].to_string();
        }
        let indented = body
            .lines()
            .map(|line| {
                if line.trim().is_empty() {
                    line.to_string()
                } else {
                    format!("  {}", line.trim_start())
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        format!("\\begin{{{open}}}\n{}\n\\end{{{open}}}", indented.trim_matches('\n'))
    });

    SECTION_SPACING_RE
        .replace_all(&text, "${1}\n\n${2}")
        .into_owned()
}
