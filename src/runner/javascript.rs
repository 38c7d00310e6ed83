use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::capability::CapabilitySet;
use crate::config::types::RuntimeConfig;
use crate::error::{Result, RunletError};
use crate::limits::{self, Limits};
use crate::runner::harness::{HarnessConfig, SandboxContext};
use crate::runner::{classify, resolve_binary, Language, LanguageRunner, OomSignals, RunnerOutcome};

/// Node aborts with this banner on stderr when the heap limit is hit.
const OOM_SIGNALS: OomSignals = OomSignals {
    stderr_marker: "heap out of memory",
    message_prefix: None,
};

/// Harness program executed by the Node.js runtime.
///
/// The user snippet never runs in this scope: it is compiled into a bare
/// `vm` context holding only the capability bindings, so Node globals
/// (`require`, `process`, timers) do not exist in there at all. The denied
/// identifiers additionally get throwing traps so touching them classifies
/// as a capability violation rather than a plain reference error.
const JS_HARNESS: &str = r#"'use strict';
const fs = require('fs');
const vm = require('vm');

const config = JSON.parse(fs.readFileSync(process.argv[2], 'utf8'));

const emit = (frame) => process.stdout.write(JSON.stringify(frame) + '\n');

const render = (value) => {
  if (typeof value === 'string') return value;
  try {
    const json = JSON.stringify(value);
    return json === undefined ? String(value) : json;
  } catch (_) {
    return String(value);
  }
};

const format = (args) => args.map(render).join(' ') + '\n';

const sandbox = Object.create(null);
sandbox.console = {
  log: (...args) => emit({ t: 'out', data: format(args) }),
  info: (...args) => emit({ t: 'out', data: format(args) }),
  warn: (...args) => emit({ t: 'err', data: format(args) }),
  error: (...args) => emit({ t: 'err', data: format(args) }),
};
sandbox.stdin = config.stdin;

for (const name of config.denied) {
  Object.defineProperty(sandbox, name, {
    configurable: false,
    get() {
      const err = new Error('capability "' + name + '" is not available in this sandbox');
      err.capabilityViolation = true;
      throw err;
    },
  });
}

try {
  const script = new vm.Script('(function (stdin) {\n' + config.source + '\n})(stdin);', {
    filename: 'snippet.js',
  });
  const value = script.runInNewContext(sandbox, { timeout: config.timeoutMs });
  emit({ t: 'done', value: value === undefined ? null : render(value) });
} catch (err) {
  if (err && err.capabilityViolation) {
    emit({ t: 'fail', kind: 'capability', message: err.message });
  } else if (err && err.code === 'ERR_SCRIPT_EXECUTION_TIMEOUT') {
    emit({ t: 'fail', kind: 'timeout', message: 'script execution timed out' });
  } else {
    const name = err && err.name ? err.name : 'Error';
    const message = err && err.message !== undefined ? err.message : String(err);
    emit({ t: 'fail', kind: 'runtime', message: name + ': ' + message });
  }
}
"#;

/// Runner for JavaScript snippets on a Node.js runtime.
pub struct JavaScriptRunner {
    binary: PathBuf,
    extra_args: Vec<String>,
}

impl JavaScriptRunner {
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        let binary = resolve_binary(config, "node", Language::JavaScript)?;
        Ok(Self {
            binary,
            extra_args: config.args.clone(),
        })
    }
}

#[async_trait]
impl LanguageRunner for JavaScriptRunner {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn runtime(&self) -> String {
        self.binary.display().to_string()
    }

    async fn execute(
        &self,
        source: &str,
        capabilities: &CapabilitySet,
        limits: &Limits,
    ) -> Result<RunnerOutcome> {
        let config = HarnessConfig::new(source, capabilities, limits);
        let context = SandboxContext::create("harness.js", JS_HARNESS, &config).await?;

        let mut command = Command::new(&self.binary);
        command
            .arg(format!(
                "--max-old-space-size={}",
                heap_limit_mb(limits.memory_limit_bytes)
            ))
            .args(&self.extra_args)
            .arg(context.harness_path())
            .arg(context.config_path())
            .current_dir(context.workdir())
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(binary = %self.binary.display(), "Spawning JavaScript sandbox");
        let child = command.spawn().map_err(|e| {
            RunletError::SandboxExecution(format!(
                "failed to spawn {}: {}",
                self.binary.display(),
                e
            ))
        })?;

        let run = limits::supervise(child, *limits).await?;
        Ok(classify(run, &OOM_SIGNALS))
    }
}

/// V8 old-space ceiling backing up the host-side sampler.
fn heap_limit_mb(memory_limit_bytes: u64) -> u64 {
    (memory_limit_bytes / (1024 * 1024)).max(16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_limit_has_a_floor() {
        assert_eq!(heap_limit_mb(512 * 1024 * 1024), 512);
        assert_eq!(heap_limit_mb(1024), 16);
    }

    #[test]
    fn harness_wraps_source_for_top_level_return() {
        assert!(JS_HARNESS.contains("(function (stdin)"));
        assert!(JS_HARNESS.contains("runInNewContext"));
    }

    #[test]
    fn missing_configured_binary_is_rejected() {
        let config = RuntimeConfig {
            binary: Some(PathBuf::from("/nonexistent/node")),
            args: Vec::new(),
        };
        let err = JavaScriptRunner::new(&config).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
