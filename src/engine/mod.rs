mod request;

pub use request::{ExecutionRequest, ExecutionResult, TerminationReason};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::capability::CapabilitySet;
use crate::config::types::RunletConfig;
use crate::limits::Limits;
use crate::recorder::ResultRecorder;
use crate::runner::{self, Language, LanguageRunner, RunnerOutcome};

/// Grace added on top of a request's timeout before the coordinator abandons
/// a runner task that failed to enforce its own deadline.
const DISPATCH_GRACE: Duration = Duration::from_millis(1_000);

/// The execution coordinator: validates submissions, dispatches them to the
/// registered runner, and always hands back a well-formed result envelope.
///
/// `submit` takes `&self` and the registry is immutable after construction,
/// so concurrent submissions never share mutable state.
pub struct Engine {
    config: RunletConfig,
    registry: HashMap<Language, Arc<dyn LanguageRunner>>,
    recorder: Option<Arc<dyn ResultRecorder>>,
}

impl Engine {
    /// Build an engine from configuration. The runner registry is fixed
    /// here; languages whose runtime is missing on this host are absent and
    /// their submissions get rejected.
    pub fn new(config: RunletConfig) -> Self {
        let registry = runner::build_registry(&config.runtimes);
        Self {
            config,
            registry,
            recorder: None,
        }
    }

    /// Engine with an explicit registry, for callers that plug their own
    /// runner implementations.
    pub fn with_registry(
        config: RunletConfig,
        registry: HashMap<Language, Arc<dyn LanguageRunner>>,
    ) -> Self {
        Self {
            config,
            registry,
            recorder: None,
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn ResultRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn supported_languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.registry.keys().copied().collect();
        languages.sort_by_key(|language| language.as_str());
        languages
    }

    /// The sole public operation: run one snippet to a terminal result.
    ///
    /// Never returns an error: validation failures, sandbox faults, and even
    /// a panicking runner all come back as a classified `ExecutionResult`.
    pub async fn submit(&self, request: ExecutionRequest) -> ExecutionResult {
        let id = generate_execution_id();
        debug!(id = %id, language = %request.language, "Received submission");

        let runner = match self.validate(&request) {
            Ok(runner) => runner,
            Err(reason) => {
                debug!(id = %id, reason = %reason, "Submission rejected");
                let result = rejected(id, reason);
                self.record(&result).await;
                return result;
            }
        };

        let limits = Limits {
            timeout: Duration::from_millis(
                request
                    .timeout_ms
                    .unwrap_or(self.config.engine.default_timeout_ms),
            ),
            memory_limit_bytes: request
                .memory_limit_bytes
                .unwrap_or_else(|| self.config.engine.default_memory_limit_bytes()),
        };
        let capabilities = CapabilitySet::for_language(request.language, request.stdin.as_deref());
        let source = request.source_code;

        debug!(id = %id, timeout_ms = limits.timeout.as_millis() as u64, "Dispatched");
        let started = Instant::now();

        // The runner runs in its own task so a panic inside it cannot tear
        // down the caller, and a runner that ignores its deadline can be
        // abandoned (its sandbox child is reaped via kill-on-drop).
        let mut handle = tokio::spawn(async move {
            runner.execute(&source, &capabilities, &limits).await
        });

        let outcome = match tokio::time::timeout(limits.timeout + DISPATCH_GRACE, &mut handle).await
        {
            Ok(Ok(Ok(outcome))) => outcome,
            Ok(Ok(Err(err))) => {
                warn!(id = %id, error = %err, "Runner failed internally");
                internal_fault()
            }
            Ok(Err(err)) => {
                warn!(id = %id, error = %err, "Runner task panicked");
                internal_fault()
            }
            Err(_) => {
                // Aborting drops the runner future; its sandbox child is
                // reaped via kill-on-drop
                warn!(id = %id, "Runner missed its deadline, abandoning task");
                handle.abort();
                RunnerOutcome {
                    reason: TerminationReason::Timeout,
                    stdout: String::new(),
                    stderr: String::new(),
                    return_value: None,
                    peak_memory_bytes: 0,
                }
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let result = ExecutionResult {
            id,
            succeeded: outcome.reason == TerminationReason::Completed,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            return_value: outcome.return_value,
            duration_ms,
            peak_memory_bytes: outcome.peak_memory_bytes,
            termination_reason: outcome.reason,
        };

        debug!(
            id = %result.id,
            reason = %result.termination_reason,
            duration_ms = result.duration_ms,
            "Submission finished"
        );
        self.record(&result).await;
        result
    }

    /// Check a request against the configured bounds before any sandbox
    /// exists. Returns the runner to dispatch to, or the rejection reason.
    fn validate(
        &self,
        request: &ExecutionRequest,
    ) -> std::result::Result<Arc<dyn LanguageRunner>, String> {
        if request.source_code.trim().is_empty() {
            return Err("source is empty".to_string());
        }
        if request.source_code.len() > self.config.engine.max_source_bytes {
            return Err(format!(
                "source exceeds {} bytes",
                self.config.engine.max_source_bytes
            ));
        }

        let timeout_ms = request
            .timeout_ms
            .unwrap_or(self.config.engine.default_timeout_ms);
        if timeout_ms == 0 || timeout_ms > self.config.engine.max_timeout_ms {
            return Err(format!(
                "timeout_ms {} is outside the accepted range 1..={}",
                timeout_ms, self.config.engine.max_timeout_ms
            ));
        }

        let memory_limit_bytes = request
            .memory_limit_bytes
            .unwrap_or_else(|| self.config.engine.default_memory_limit_bytes());
        let max_memory = self.config.engine.max_memory_limit_bytes();
        if memory_limit_bytes < 1024 * 1024 || memory_limit_bytes > max_memory {
            return Err(format!(
                "memory_limit_bytes {} is outside the accepted range {}..={}",
                memory_limit_bytes,
                1024 * 1024,
                max_memory
            ));
        }

        self.registry
            .get(&request.language)
            .map(Arc::clone)
            .ok_or_else(|| {
                format!(
                    "language {} is not supported on this host",
                    request.language
                )
            })
    }

    async fn record(&self, result: &ExecutionResult) {
        if let Some(recorder) = &self.recorder {
            if let Err(err) = recorder.record(result).await {
                warn!(id = %result.id, error = %err, "Result recorder failed");
            }
        }
    }
}

fn rejected(id: String, reason: String) -> ExecutionResult {
    ExecutionResult {
        id,
        succeeded: false,
        stdout: String::new(),
        stderr: reason,
        return_value: None,
        duration_ms: 0,
        peak_memory_bytes: 0,
        termination_reason: TerminationReason::Rejected,
    }
}

/// Outcome stood in for a host-side fault; internal detail stays in the log.
fn internal_fault() -> RunnerOutcome {
    RunnerOutcome {
        reason: TerminationReason::RuntimeError,
        stdout: String::new(),
        stderr: "internal execution failure".to_string(),
        return_value: None,
        peak_memory_bytes: 0,
    }
}

fn generate_execution_id() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;

    let counter = COUNTER.fetch_add(1, Ordering::SeqCst);

    // Short correlatable token from timestamp + counter, base36 for
    // compactness
    let combined = (timestamp & 0xFFFFFF) << 16 | (counter as u64 & 0xFFFF);
    format_base36(combined)
}

fn format_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_round_digits() {
        assert_eq!(format_base36(0), "0");
        assert_eq!(format_base36(35), "z");
        assert_eq!(format_base36(36), "10");
    }

    #[test]
    fn execution_ids_are_distinct_in_sequence() {
        let a = generate_execution_id();
        let b = generate_execution_id();
        assert_ne!(a, b);
    }
}
