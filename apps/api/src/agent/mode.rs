use serde::{Deserialize, Serialize};

/// Requests containing any of these are treated as edits when no mode is given.
const EDIT_KEYWORDS: &[&str] = &[
    "add", "fix", "change", "update", "create", "modify", "replace", "insert",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    Ask,
    Edit,
}

impl AgentMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ask" => Some(AgentMode::Ask),
            "edit" => Some(AgentMode::Edit),
            _ => None,
        }
    }
}

/// An explicit `ask`/`edit` wins; anything else falls back to keyword matching.
pub fn detect_mode(request: &str, explicit: Option<&str>) -> AgentMode {
    if let Some(mode) = explicit.and_then(AgentMode::parse) {
        return mode;
    }

    let lowered = request.to_lowercase();
    if EDIT_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        AgentMode::Edit
    } else {
        AgentMode::Ask
    }
}
