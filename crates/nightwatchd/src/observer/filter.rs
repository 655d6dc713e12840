//! Event filter - decides which log lines are incident-worthy.
//!
//! Order matters: lifecycle noise is dropped first, then everything on
//! stderr passes, then stdout lines pass only on an error keyword or one
//! of the error-shaped regexes.

use std::sync::LazyLock;

use regex::Regex;

use crate::runtime::{LogEvent, LogStreamKind};

/// Graceful startup/shutdown, signal handling and health-check chatter.
const LIFECYCLE_KEYWORDS: &[&str] = &[
    "starting up",
    "started successfully",
    "listening on",
    "ready to accept connections",
    "shutting down",
    "shutdown complete",
    "stopped gracefully",
    "graceful shutdown",
    "received signal",
    "sigterm",
    "sigint",
    "signal handler",
    "health check",
    "healthcheck",
    "health probe",
];

const ERROR_KEYWORDS: &[&str] = &[
    "error",
    "exception",
    "failed",
    "failure",
    "fatal",
    "panic",
    "refused",
    "timeout",
    "timed out",
    "unavailable",
    "unreachable",
    "oomkilled",
    "out of memory",
    "killed",
    "denied",
    "unable to",
    "cannot",
    "crash",
    "stopped unexpectedly",
];

/// HTTP 4xx/5xx status mentions, e.g. `HTTP/1.1" 503` or `status code 404`.
static HTTP_STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:http/\d(?:\.\d)?"?\s+|\bstatus(?:\s+code)?\s*[:=]?\s*|\breturned\s+)[45]\d{2}\b"#)
        .unwrap()
});

/// Structured log levels, e.g. `level=error` or `"level": "fatal"`.
static LOG_LEVEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\blevel["']?\s*[:=]\s*["']?(error|fatal|critical|panic)\b"#).unwrap()
});

pub fn is_lifecycle_noise(message: &str) -> bool {
    let lowered = message.to_lowercase();
    LIFECYCLE_KEYWORDS.iter().any(|k| lowered.contains(k))
}

fn has_error_signal(message: &str) -> bool {
    let lowered = message.to_lowercase();
    ERROR_KEYWORDS.iter().any(|k| lowered.contains(k))
        || HTTP_STATUS_RE.is_match(message)
        || LOG_LEVEL_RE.is_match(message)
}

/// Whether the event should reach the batch buffer.
pub fn should_include(event: &LogEvent) -> bool {
    if is_lifecycle_noise(&event.message) {
        return false;
    }
    if event.stream == LogStreamKind::Stderr {
        return true;
    }
    has_error_signal(&event.message)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(message: &str, stream: LogStreamKind) -> LogEvent {
        LogEvent {
            container: "cache".to_string(),
            message: message.to_string(),
            stream,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_lifecycle_noise_dropped() {
        assert!(!should_include(&event(
            "Redis starting up, version 7.2",
            LogStreamKind::Stdout
        )));
        assert!(!should_include(&event(
            "Received SIGTERM, shutting down",
            LogStreamKind::Stdout
        )));
        assert!(!should_include(&event(
            "GET /healthcheck 200",
            LogStreamKind::Stdout
        )));
    }

    #[test]
    fn test_lifecycle_dropped_even_on_stderr() {
        assert!(!should_include(&event(
            "graceful shutdown complete",
            LogStreamKind::Stderr
        )));
    }

    #[test]
    fn test_stderr_included_after_lifecycle_filter() {
        assert!(should_include(&event(
            "something odd happened",
            LogStreamKind::Stderr
        )));
    }

    #[test]
    fn test_stdout_needs_error_signal() {
        assert!(!should_include(&event(
            "served request in 12ms",
            LogStreamKind::Stdout
        )));
        assert!(should_include(&event(
            "Error: cache connection refused",
            LogStreamKind::Stdout
        )));
        assert!(should_include(&event(
            "Container stopped unexpectedly",
            LogStreamKind::Stdout
        )));
    }

    #[test]
    fn test_http_status_regex() {
        assert!(should_include(&event(
            "\"GET /api HTTP/1.1\" 503 0",
            LogStreamKind::Stdout
        )));
        assert!(should_include(&event(
            "upstream status code 404",
            LogStreamKind::Stdout
        )));
        assert!(should_include(&event(
            "API returned 503",
            LogStreamKind::Stdout
        )));
        assert!(!should_include(&event(
            "\"GET /api HTTP/1.1\" 200 0",
            LogStreamKind::Stdout
        )));
    }

    #[test]
    fn test_structured_level_regex() {
        assert!(should_include(&event(
            "level=panic msg=\"worker died\"",
            LogStreamKind::Stdout
        )));
        assert!(should_include(&event(
            r#"{"level": "critical", "msg": "disk"}"#,
            LogStreamKind::Stdout
        )));
        assert!(!should_include(&event(
            "level=info msg=\"tick\"",
            LogStreamKind::Stdout
        )));
    }

    #[test]
    fn test_filter_is_deterministic() {
        let e = event("Error: boom", LogStreamKind::Stdout);
        assert_eq!(should_include(&e), should_include(&e));
    }
}
