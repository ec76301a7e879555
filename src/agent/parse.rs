//! Parsing of raw model output.

use serde::Deserialize;

use super::state::{Plan, PlanError};

#[derive(Debug, Deserialize)]
struct PlanResponse {
    plan: Option<Vec<String>>,
}

/// Parses a planner response of the form `{"plan": ["step", ...]}`.
///
/// The JSON may be wrapped in a ```json fence or surrounded by prose.
pub fn parse_plan(output: &str) -> Result<Plan, String> {
    let json = extract_json(output).ok_or_else(|| "response contained no JSON object".to_string())?;

    let response: PlanResponse =
        serde_json::from_str(json).map_err(|e| format!("response was not valid JSON: {e}"))?;

    let steps = response
        .plan
        .ok_or_else(|| "response did not contain a 'plan' list".to_string())?;

    Plan::new(steps).map_err(|e| match e {
        PlanError::Empty => "the plan list was empty".to_string(),
        other => other.to_string(),
    })
}

fn extract_json(output: &str) -> Option<&str> {
    // fenced block first
    if let Some(start) = output.find("```json") {
        let json_start = start + 7;
        if let Some(end) = output[json_start..].find("```") {
            return Some(output[json_start..json_start + end].trim());
        }
    }

    let json_start = output.find('{')?;
    let json_end = output.rfind('}')?;
    if json_start < json_end {
        Some(&output[json_start..=json_end])
    } else {
        None
    }
}

/// Strips markdown code fences from a generated fragment.
///
/// Handles a leading ```` ```python ```` or bare ```` ``` ```` and a trailing
/// ```` ``` ````; the result is trimmed. A language tag is dropped even when
/// the code follows it on the same line.
pub fn strip_code_fences(output: &str) -> String {
    let mut code = output.trim();

    if let Some(rest) = code.strip_prefix("```") {
        // drop the info string (e.g. "python") up to the first newline
        code = match rest.find('\n') {
            Some(newline) if !rest[..newline].trim().contains(' ') => &rest[newline + 1..],
            _ => strip_language_tag(rest),
        };
    }
    if let Some(rest) = code.trim_end().strip_suffix("```") {
        code = rest;
    }

    code.trim().to_string()
}

fn strip_language_tag(rest: &str) -> &str {
    for tag in ["python3", "python", "py"] {
        if let Some(after) = rest.strip_prefix(tag) {
            if after.starts_with(char::is_whitespace) {
                return after;
            }
        }
    }
    rest
}
