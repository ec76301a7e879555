//! Text report format for execution outcomes.
//!
//! The worker channel carries plain text so that any caller can tell outcomes
//! apart without structured typing:
//!
//! ```text
//! Execution Blocked by Static Analysis: <reason>
//!
//! Execution Result (code <exit_code>):
//! ---_START_OF_OUTPUT_---
//! [stdout]
//! <stdout>
//! [stderr]
//! <stderr>
//! ---_END_OF_OUTPUT_---
//!
//! Execution Error: <message>
//! ```
//!
//! Standard output and standard error are always labeled separately, and both
//! labels are present even when a stream is empty. When either stream was cut
//! at the capture limit the header reads `(code <exit_code>, truncated)`.
//!
//! The sections are not escaped. Parsing splits at the last `[stderr]` line,
//! so a stderr stream that itself prints a `[stderr]` line comes back with
//! the text before that line moved into stdout.

use std::time::Duration;

use super::{ExecutionError, ExecutionResult};

/// Marker opening the captured output block.
pub const OUTPUT_START: &str = "---_START_OF_OUTPUT_---";
/// Marker closing the captured output block.
pub const OUTPUT_END: &str = "---_END_OF_OUTPUT_---";

const BLOCKED_PREFIX: &str = "Execution Blocked by Static Analysis: ";
const ERROR_PREFIX: &str = "Execution Error: ";
const RESULT_PREFIX: &str = "Execution Result (code ";
const STDOUT_LABEL: &str = "[stdout]";
const STDERR_LABEL: &str = "[stderr]";
const TRUNCATED_FLAG: &str = ", truncated";

/// Renders an execution outcome as report text.
pub fn render_report(outcome: &Result<ExecutionResult, ExecutionError>) -> String {
    match outcome {
        Ok(result) => format!(
            "{RESULT_PREFIX}{}{}):\n{OUTPUT_START}\n{STDOUT_LABEL}\n{}\n{STDERR_LABEL}\n{}\n{OUTPUT_END}",
            result.exit_code,
            if result.truncated { TRUNCATED_FLAG } else { "" },
            result.stdout,
            result.stderr
        ),
        Err(ExecutionError::SafetyViolation(reason)) => format!("{BLOCKED_PREFIX}{reason}"),
        Err(err) => format!("{ERROR_PREFIX}{err}"),
    }
}

/// Parses report text back into a typed outcome.
///
/// The duration is not part of the text and comes back as zero; callers that
/// measure the round trip fill it in. Text that matches none of the formats is
/// reported as [`ExecutionError::Unknown`].
pub fn parse_report(text: &str) -> Result<ExecutionResult, ExecutionError> {
    if let Some(reason) = text.strip_prefix(BLOCKED_PREFIX) {
        return Err(ExecutionError::SafetyViolation(reason.to_string()));
    }
    if let Some(message) = text.strip_prefix(ERROR_PREFIX) {
        return Err(parse_error_message(message));
    }
    if text.starts_with(RESULT_PREFIX) {
        return parse_result(text).ok_or_else(|| {
            ExecutionError::Unknown(format!("malformed execution report: {}", preview(text)))
        });
    }

    Err(ExecutionError::Unknown(format!(
        "unrecognized execution report: {}",
        preview(text)
    )))
}

fn parse_error_message(message: &str) -> ExecutionError {
    if let Some(rest) = message.strip_prefix("process timed out after ") {
        let secs = rest
            .strip_suffix(" seconds")
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|s| s.is_finite() && *s >= 0.0);
        if let Some(secs) = secs {
            return ExecutionError::Timeout(Duration::from_secs_f64(secs));
        }
    }
    if let Some(rest) = message.strip_prefix("failed to start interpreter: ") {
        return ExecutionError::SpawnFailure(rest.to_string());
    }
    if let Some(rest) = message.strip_prefix("permission denied: ") {
        return ExecutionError::PermissionFailure(rest.to_string());
    }
    if let Some(rest) = message.strip_prefix("blocked by static analysis: ") {
        return ExecutionError::SafetyViolation(rest.to_string());
    }
    let rest = message
        .strip_prefix("unexpected execution error: ")
        .unwrap_or(message);
    ExecutionError::Unknown(rest.to_string())
}

fn parse_result(text: &str) -> Option<ExecutionResult> {
    let header_end = text.find("):\n")?;
    let header = &text[RESULT_PREFIX.len()..header_end];
    let (code, truncated) = match header.strip_suffix(TRUNCATED_FLAG) {
        Some(code) => (code, true),
        None => (header, false),
    };
    let exit_code = code.trim().parse().ok()?;

    let body_start = text.find(OUTPUT_START)? + OUTPUT_START.len();
    let body_end = text.rfind(OUTPUT_END)?;
    if body_end < body_start {
        return None;
    }
    let body = text[body_start..body_end].trim_matches('\n');

    let after_stdout = body.strip_prefix(STDOUT_LABEL)?;
    let stderr_marker = format!("\n{STDERR_LABEL}");
    // the last marker wins so that a literal "[stderr]" printed to stdout stays in stdout
    let split = after_stdout.rfind(&stderr_marker)?;
    let stdout = after_stdout[..split].trim_matches('\n');
    let stderr = after_stdout[split + stderr_marker.len()..].trim_matches('\n');

    Some(ExecutionResult {
        exit_code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        duration: Duration::ZERO,
        truncated,
    })
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 120;
    match text.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(exit_code: i32, stdout: &str, stderr: &str) -> ExecutionResult {
        ExecutionResult {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration: Duration::ZERO,
            truncated: false,
        }
    }

    #[test]
    fn completed_report_labels_streams() {
        let text = render_report(&Ok(result(0, "hello\nworld", "warning: x")));

        assert_eq!(
            text,
            "Execution Result (code 0):\n---_START_OF_OUTPUT_---\n[stdout]\nhello\nworld\n[stderr]\nwarning: x\n---_END_OF_OUTPUT_---"
        );
    }

    #[test]
    fn blocked_report_carries_reason() {
        let text = render_report(&Err(ExecutionError::SafetyViolation(
            "Unsafe import detected: 'os'".to_string(),
        )));

        assert_eq!(
            text,
            "Execution Blocked by Static Analysis: Unsafe import detected: 'os'"
        );
    }

    #[test]
    fn timeout_report_reads_like_the_worker_contract() {
        let text = render_report(&Err(ExecutionError::Timeout(Duration::from_secs(30))));
        assert_eq!(text, "Execution Error: process timed out after 30 seconds");
    }

    #[test]
    fn completed_reports_parse_back() {
        let original = result(3, "line one\nline two", "Traceback: boom");
        let parsed = parse_report(&render_report(&Ok(original.clone()))).unwrap();
        assert_eq!(parsed, original);

        let empty = result(0, "", "");
        let parsed = parse_report(&render_report(&Ok(empty.clone()))).unwrap();
        assert_eq!(parsed, empty);

        let cut = ExecutionResult {
            truncated: true,
            ..result(0, "xxxx", "")
        };
        let text = render_report(&Ok(cut.clone()));
        assert!(text.starts_with("Execution Result (code 0, truncated):\n"));
        assert_eq!(parse_report(&text).unwrap(), cut);
    }

    #[test]
    fn stderr_label_inside_stderr_shifts_text_into_stdout() {
        let parsed = parse_report(&render_report(&Ok(result(1, "out", "a\n[stderr]\nb")))).unwrap();

        assert_eq!(parsed.stdout, "out\n[stderr]\na");
        assert_eq!(parsed.stderr, "b");
    }

    #[test]
    fn negative_exit_codes_parse_back() {
        let parsed = parse_report(&render_report(&Ok(result(-1, "", "killed")))).unwrap();
        assert_eq!(parsed.exit_code, -1);
        assert_eq!(parsed.stderr, "killed");
    }

    #[test]
    fn failure_kinds_survive_the_text_channel() {
        let outcomes = vec![
            ExecutionError::SafetyViolation("Unsafe function call detected: 'eval()'".into()),
            ExecutionError::Timeout(Duration::from_millis(1500)),
            ExecutionError::SpawnFailure("interpreter 'python3' not found".into()),
            ExecutionError::PermissionFailure("cannot execute 'python3'".into()),
            ExecutionError::Unknown("pipe closed".into()),
        ];

        for err in outcomes {
            let parsed = parse_report(&render_report(&Err(err.clone())));
            assert_eq!(parsed, Err(err));
        }
    }

    #[test]
    fn unrecognized_text_is_unknown() {
        let parsed = parse_report("something else entirely");
        assert!(matches!(parsed, Err(ExecutionError::Unknown(msg)) if msg.contains("unrecognized")));
    }

    #[test]
    fn truncated_result_report_is_unknown() {
        let parsed = parse_report("Execution Result (code 0):\n---_START_OF_OUTPUT_---\n[stdout]\nhi");
        assert!(matches!(parsed, Err(ExecutionError::Unknown(msg)) if msg.contains("malformed")));
    }
}
