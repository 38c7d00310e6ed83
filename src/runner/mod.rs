mod harness;
mod javascript;
mod python;

pub use javascript::JavaScriptRunner;
pub use python::PythonRunner;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capability::CapabilitySet;
use crate::config::types::{RuntimeConfig, RuntimesConfig};
use crate::engine::TerminationReason;
use crate::error::{Result, RunletError};
use crate::limits::{LimitStatus, LimitedRun, Limits};

use harness::{FailKind, Terminal};

/// Language tag for a submitted snippet.
///
/// A closed enum: the runner registry is keyed on this, so adding a language
/// is a compile-time change, never runtime string dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// JavaScript executed by a Node.js runtime
    #[value(name = "javascript", alias = "js")]
    JavaScript,
    /// Python executed by a CPython runtime
    #[value(name = "python", alias = "py")]
    Python,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::Python => "python",
        }
    }

    /// Infer the language from a source file extension.
    pub fn from_extension(extension: &str) -> Option<Language> {
        match extension {
            "js" | "mjs" | "cjs" => Some(Language::JavaScript),
            "py" => Some(Language::Python),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw classification of one runner invocation, before the coordinator
/// wraps it into the public result envelope.
#[derive(Debug)]
pub struct RunnerOutcome {
    pub reason: TerminationReason,
    pub stdout: String,
    pub stderr: String,
    pub return_value: Option<String>,
    pub peak_memory_bytes: u64,
}

/// Trait for per-language execution runners.
///
/// Abstracts one language's runtime so the coordinator can treat all
/// languages interchangeably. Implementations must be stateless across
/// calls: every `execute` builds a fresh sandbox and tears it down before
/// returning.
#[async_trait]
pub trait LanguageRunner: Send + Sync {
    /// The language this runner executes
    fn language(&self) -> Language;

    /// Resolved runtime description (binary path)
    fn runtime(&self) -> String;

    /// Execute one snippet inside a fresh sandbox under the given limits
    async fn execute(
        &self,
        source: &str,
        capabilities: &CapabilitySet,
        limits: &Limits,
    ) -> Result<RunnerOutcome>;
}

/// Build the runner registry for the configured runtimes.
///
/// Languages whose runtime binary cannot be resolved are skipped with a
/// warning; submissions for them are rejected by the coordinator.
pub fn build_registry(config: &RuntimesConfig) -> HashMap<Language, Arc<dyn LanguageRunner>> {
    let mut registry: HashMap<Language, Arc<dyn LanguageRunner>> = HashMap::new();

    match JavaScriptRunner::new(&config.javascript) {
        Ok(runner) => {
            registry.insert(Language::JavaScript, Arc::new(runner));
        }
        Err(e) => warn!(language = %Language::JavaScript, error = %e, "Skipping unavailable runner"),
    }

    match PythonRunner::new(&config.python) {
        Ok(runner) => {
            registry.insert(Language::Python, Arc::new(runner));
        }
        Err(e) => warn!(language = %Language::Python, error = %e, "Skipping unavailable runner"),
    }

    registry
}

/// Probe result for one language runtime on this system.
#[derive(Debug)]
pub struct RunnerInfo {
    pub language: Language,
    pub available: bool,
    pub runtime: Option<String>,
    pub unavailable_reason: Option<String>,
}

/// Get information about supported runtimes on this system.
pub fn available_runners(config: &RuntimesConfig) -> Vec<RunnerInfo> {
    vec![
        probe(
            Language::JavaScript,
            JavaScriptRunner::new(&config.javascript).map(|r| r.runtime()),
        ),
        probe(
            Language::Python,
            PythonRunner::new(&config.python).map(|r| r.runtime()),
        ),
    ]
}

fn probe(language: Language, resolved: Result<String>) -> RunnerInfo {
    match resolved {
        Ok(runtime) => RunnerInfo {
            language,
            available: true,
            runtime: Some(runtime),
            unavailable_reason: None,
        },
        Err(e) => RunnerInfo {
            language,
            available: false,
            runtime: None,
            unavailable_reason: Some(e.to_string()),
        },
    }
}

/// Resolve the runtime binary for a runner: explicit config path when set,
/// PATH lookup of the standard name otherwise.
pub(crate) fn resolve_binary(
    config: &RuntimeConfig,
    default_name: &str,
    language: Language,
) -> Result<PathBuf> {
    match &config.binary {
        Some(path) => {
            if path.exists() {
                Ok(path.clone())
            } else {
                Err(RunletError::RuntimeUnavailable {
                    language: language.to_string(),
                    reason: format!("configured binary {} does not exist", path.display()),
                })
            }
        }
        None => which::which(default_name).map_err(|e| RunletError::RuntimeUnavailable {
            language: language.to_string(),
            reason: format!("{} not found on PATH: {}", default_name, e),
        }),
    }
}

/// Runtime-specific markers for out-of-memory aborts that bypass the frame
/// protocol (a crashed runtime cannot emit a terminal frame).
pub(crate) struct OomSignals {
    /// Substring of raw runtime stderr indicating an out-of-memory abort
    pub stderr_marker: &'static str,
    /// Failure-message prefix indicating the runtime ran out of memory
    pub message_prefix: Option<&'static str>,
}

/// Map one supervised run plus its parsed frames onto a runner outcome.
///
/// User-visible stderr is assembled from `err` frames plus the failure
/// message; raw runtime stderr never reaches the result envelope.
pub(crate) fn classify(run: LimitedRun, signals: &OomSignals) -> RunnerOutcome {
    let report = harness::parse_frames(&run.stdout);
    for line in &report.noise {
        debug!(line = %line, "Unframed sandbox stdout");
    }
    let raw_stderr = String::from_utf8_lossy(&run.stderr);
    if !raw_stderr.is_empty() {
        debug!(stderr = %raw_stderr, "Raw runtime stderr");
    }

    let stdout = report.stdout;
    let mut stderr = report.stderr;
    let mut return_value = None;

    let reason = match run.status {
        LimitStatus::Timeout => TerminationReason::Timeout,
        LimitStatus::MemoryExceeded => TerminationReason::MemoryExceeded,
        LimitStatus::Completed { .. } => match report.terminal {
            Some(Terminal::Done { value }) => {
                return_value = value;
                TerminationReason::Completed
            }
            Some(Terminal::Fail {
                kind: FailKind::Capability,
                message,
            }) => {
                push_line(&mut stderr, &message);
                TerminationReason::CapabilityViolation
            }
            Some(Terminal::Fail {
                kind: FailKind::Timeout,
                ..
            }) => TerminationReason::Timeout,
            Some(Terminal::Fail {
                kind: FailKind::Runtime,
                message,
            }) => {
                let out_of_memory = signals
                    .message_prefix
                    .map_or(false, |prefix| message.starts_with(prefix));
                push_line(&mut stderr, &message);
                if out_of_memory {
                    TerminationReason::MemoryExceeded
                } else {
                    TerminationReason::RuntimeError
                }
            }
            None => {
                // Child died without a terminal frame: a runtime-level abort
                if raw_stderr.contains(signals.stderr_marker) {
                    TerminationReason::MemoryExceeded
                } else {
                    push_line(&mut stderr, "execution runtime terminated unexpectedly");
                    TerminationReason::RuntimeError
                }
            }
        },
    };

    RunnerOutcome {
        reason,
        stdout,
        stderr,
        return_value,
        peak_memory_bytes: run.peak_memory_bytes,
    }
}

fn push_line(buffer: &mut String, line: &str) {
    if !buffer.is_empty() && !buffer.ends_with('\n') {
        buffer.push('\n');
    }
    buffer.push_str(line);
}
