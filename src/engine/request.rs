use serde::{Deserialize, Serialize};
use std::fmt;

use crate::runner::Language;

/// A single snippet submission. Immutable once accepted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub source_code: String,
    pub language: Language,
    /// Value surfaced to the snippet as its stdin equivalent
    pub stdin: Option<String>,
    /// Wall-clock ceiling; the engine default applies when unset
    pub timeout_ms: Option<u64>,
    /// Memory ceiling; the engine default applies when unset
    pub memory_limit_bytes: Option<u64>,
}

impl ExecutionRequest {
    pub fn new(language: Language, source_code: impl Into<String>) -> Self {
        Self {
            source_code: source_code.into(),
            language,
            stdin: None,
            timeout_ms: None,
            memory_limit_bytes: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_memory_limit_bytes(mut self, memory_limit_bytes: u64) -> Self {
        self.memory_limit_bytes = Some(memory_limit_bytes);
        self
    }
}

/// Classified outcome of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Ran to completion (the snippet itself may still have reported errors
    /// through its own output)
    Completed,
    /// Killed at the wall-clock ceiling
    Timeout,
    /// Killed at the memory ceiling, or aborted by the runtime's own limit
    MemoryExceeded,
    /// The snippet threw, or failed to parse
    RuntimeError,
    /// The snippet touched a denied host capability
    CapabilityViolation,
    /// Refused before any sandbox was constructed
    Rejected,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Completed => "completed",
            TerminationReason::Timeout => "timeout",
            TerminationReason::MemoryExceeded => "memory_exceeded",
            TerminationReason::RuntimeError => "runtime_error",
            TerminationReason::CapabilityViolation => "capability_violation",
            TerminationReason::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result envelope returned for every submission, success or failure.
///
/// Created exactly once per request and owned by the caller afterwards;
/// `duration_ms` and `peak_memory_bytes` are populated on every path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Opaque token correlating this result with logs and history
    pub id: String,
    pub succeeded: bool,
    pub stdout: String,
    pub stderr: String,
    /// Stringified value of the snippet's final expression, when there was one
    pub return_value: Option<String>,
    /// Wall clock from dispatch to completion; 0 for rejected requests
    pub duration_ms: u64,
    pub peak_memory_bytes: u64,
    pub termination_reason: TerminationReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_only_what_was_asked() {
        let request = ExecutionRequest::new(Language::JavaScript, "return 1;")
            .with_stdin("data")
            .with_timeout_ms(250);

        assert_eq!(request.source_code, "return 1;");
        assert_eq!(request.stdin.as_deref(), Some("data"));
        assert_eq!(request.timeout_ms, Some(250));
        assert!(request.memory_limit_bytes.is_none());
    }

    #[test]
    fn termination_reason_serializes_snake_case() {
        let json = serde_json::to_string(&TerminationReason::MemoryExceeded).unwrap();
        assert_eq!(json, "\"memory_exceeded\"");
    }
}
