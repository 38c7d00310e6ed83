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

/// A CPython that dies on the armed address-space rlimit prints a
/// MemoryError traceback; a contained one raises it into the harness.
const OOM_SIGNALS: OomSignals = OomSignals {
    stderr_marker: "MemoryError",
    message_prefix: Some("MemoryError"),
};

/// Harness program executed by the CPython runtime.
///
/// User code runs against a namespace whose `__builtins__` is an explicit
/// allow-list of pure computation primitives; `print`/`input` are
/// capability-backed shims, denied names raise a violation that derives
/// from BaseException so a broad `except Exception` cannot swallow it.
const PY_HARNESS: &str = r#"import json
import sys

with open(sys.argv[1]) as _fh:
    config = json.load(_fh)

_stdout = sys.stdout


def _emit(frame):
    _stdout.write(json.dumps(frame) + "\n")
    _stdout.flush()


try:
    import resource

    _limit = config["memoryLimitBytes"]
    resource.setrlimit(resource.RLIMIT_AS, (_limit, _limit))
except Exception:
    pass


class _CapabilityViolation(BaseException):
    pass


def _denied(name):
    def _trap(*_args, **_kwargs):
        raise _CapabilityViolation(
            'capability "%s" is not available in this sandbox' % name
        )

    return _trap


_ALLOWED_BUILTINS = (
    "abs", "all", "any", "ascii", "bin", "bool", "bytearray", "bytes",
    "callable", "chr", "complex", "dict", "divmod", "enumerate", "filter",
    "float", "format", "frozenset", "hash", "hex", "int", "isinstance",
    "issubclass", "iter", "len", "list", "map", "max", "min", "next",
    "object", "oct", "ord", "pow", "range", "repr", "reversed", "round",
    "set", "slice", "sorted", "str", "sum", "tuple", "type", "zip",
    "BaseException", "Exception", "ArithmeticError", "AttributeError",
    "EOFError", "IndexError", "KeyError", "LookupError", "MemoryError",
    "NameError", "OverflowError", "RecursionError", "RuntimeError",
    "StopIteration", "TypeError", "ValueError", "ZeroDivisionError",
)

import builtins as _builtins

_safe = {}
for _name in _ALLOWED_BUILTINS:
    if hasattr(_builtins, _name):
        _safe[_name] = getattr(_builtins, _name)


def _print(*args, sep=" ", end="\n", **_kwargs):
    _emit({"t": "out", "data": sep.join(str(a) for a in args) + end})


_stdin_lines = iter(config["stdin"].splitlines())


def _input(_prompt=None):
    try:
        return next(_stdin_lines)
    except StopIteration:
        raise EOFError("stdin exhausted")


_safe["print"] = _print
_safe["input"] = _input
for _name in config["denied"]:
    _safe[_name] = _denied(_name)

_globals = {"__builtins__": _safe, "__name__": "__main__", "stdin": config["stdin"]}

try:
    try:
        _code = compile(config["source"], "snippet.py", "eval")
    except SyntaxError:
        _code = compile(config["source"], "snippet.py", "exec")
        exec(_code, _globals)
        _value = None
    else:
        _value = eval(_code, _globals)
    if _value is None:
        _emit({"t": "done", "value": None})
    else:
        _rendered = _value if isinstance(_value, str) else repr(_value)
        _emit({"t": "done", "value": _rendered})
except _CapabilityViolation as err:
    _emit({"t": "fail", "kind": "capability", "message": str(err)})
except BaseException as err:
    _emit(
        {
            "t": "fail",
            "kind": "runtime",
            "message": type(err).__name__ + ": " + str(err),
        }
    )
"#;

/// Runner for Python snippets on a CPython runtime.
pub struct PythonRunner {
    binary: PathBuf,
    extra_args: Vec<String>,
}

impl PythonRunner {
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        let binary = resolve_binary(config, "python3", Language::Python)?;
        Ok(Self {
            binary,
            extra_args: config.args.clone(),
        })
    }
}

#[async_trait]
impl LanguageRunner for PythonRunner {
    fn language(&self) -> Language {
        Language::Python
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
        let context = SandboxContext::create("harness.py", PY_HARNESS, &config).await?;

        let mut command = Command::new(&self.binary);
        command
            // Isolated mode: no user site-packages, no PYTHON* env influence
            .arg("-I")
            .args(&self.extra_args)
            .arg(context.harness_path())
            .arg(context.config_path())
            .current_dir(context.workdir())
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(binary = %self.binary.display(), "Spawning Python sandbox");
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harness_restricts_builtins_and_compiles_eval_first() {
        assert!(PY_HARNESS.contains("__builtins__"));
        assert!(PY_HARNESS.contains("\"eval\""));
        assert!(PY_HARNESS.contains("\"exec\""));
    }

    #[test]
    fn missing_configured_binary_is_rejected() {
        let config = RuntimeConfig {
            binary: Some(PathBuf::from("/nonexistent/python3")),
            args: Vec::new(),
        };
        let err = PythonRunner::new(&config).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
