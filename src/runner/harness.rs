//! Wire protocol between the host and the in-sandbox harness program.
//!
//! The harness is the only writer on the child's stdout: sandboxed code can
//! reach that stream only through the capability-backed console, which the
//! harness JSON-encodes, so frames cannot be forged from inside the sandbox.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::capability::CapabilitySet;
use crate::error::{Result, RunletError};
use crate::limits::Limits;

/// One line of harness output.
#[derive(Debug, Deserialize)]
#[serde(tag = "t", rename_all = "lowercase")]
pub(crate) enum Frame {
    /// Captured console/stdout chunk
    Out { data: String },
    /// Captured console-error/stderr chunk
    Err { data: String },
    /// Terminal frame: the snippet finished with a value
    Done { value: Option<String> },
    /// Terminal frame: the snippet failed
    Fail { kind: FailKind, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum FailKind {
    Runtime,
    Capability,
    /// In-runtime watchdog fired before the host deadline
    Timeout,
}

#[derive(Debug)]
pub(crate) enum Terminal {
    Done { value: Option<String> },
    Fail { kind: FailKind, message: String },
}

/// Captured output reassembled from one harness stdout stream. When the
/// child was killed mid-run, `terminal` is absent and the buffers hold
/// whatever was captured before the kill.
#[derive(Debug, Default)]
pub(crate) struct HarnessReport {
    pub stdout: String,
    pub stderr: String,
    pub terminal: Option<Terminal>,
    /// Lines that were not valid frames (runtime noise, crash banners)
    pub noise: Vec<String>,
}

pub(crate) fn parse_frames(raw: &[u8]) -> HarnessReport {
    let mut report = HarnessReport::default();

    for line in String::from_utf8_lossy(raw).lines() {
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Frame>(line) {
            Ok(Frame::Out { data }) => report.stdout.push_str(&data),
            Ok(Frame::Err { data }) => report.stderr.push_str(&data),
            Ok(Frame::Done { value }) => {
                report.terminal = Some(Terminal::Done { value });
                break;
            }
            Ok(Frame::Fail { kind, message }) => {
                report.terminal = Some(Terminal::Fail { kind, message });
                break;
            }
            Err(_) => report.noise.push(line.to_string()),
        }
    }

    report
}

/// Everything the harness needs to know about one execution, written as
/// `config.json` next to the harness program.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HarnessConfig<'a> {
    pub source: &'a str,
    pub stdin: &'a str,
    pub denied: Vec<&'static str>,
    pub timeout_ms: u64,
    pub memory_limit_bytes: u64,
}

impl<'a> HarnessConfig<'a> {
    pub fn new(source: &'a str, capabilities: &'a CapabilitySet, limits: &Limits) -> Self {
        Self {
            source,
            stdin: &capabilities.stdin,
            denied: capabilities.denied_identifiers(),
            timeout_ms: limits.timeout.as_millis() as u64,
            memory_limit_bytes: limits.memory_limit_bytes,
        }
    }
}

/// Single-use isolated execution environment: an owned scratch directory
/// holding the generated harness program and its config. The directory is
/// removed when this is dropped, whichever way the invocation ended.
pub(crate) struct SandboxContext {
    dir: tempfile::TempDir,
    harness_name: &'static str,
}

impl SandboxContext {
    pub async fn create(
        harness_name: &'static str,
        harness_source: &str,
        config: &HarnessConfig<'_>,
    ) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("runlet-")
            .tempdir()
            .map_err(|e| RunletError::SandboxSetup(format!("scratch dir: {}", e)))?;

        let context = Self { dir, harness_name };
        tokio::fs::write(context.harness_path(), harness_source).await?;
        tokio::fs::write(context.config_path(), serde_json::to_vec(config)?).await?;

        Ok(context)
    }

    pub fn harness_path(&self) -> PathBuf {
        self.dir.path().join(self.harness_name)
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.json")
    }

    pub fn workdir(&self) -> &Path {
        self.dir.path()
    }
}
