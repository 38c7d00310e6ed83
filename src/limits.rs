use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tracing::debug;

use crate::error::{Result, RunletError};

/// Hard ceilings applied to a single execution.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub timeout: Duration,
    pub memory_limit_bytes: u64,
}

/// How a supervised child finished. Exactly one of these is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitStatus {
    /// Exited on its own within limits
    Completed { exit_code: i32 },
    /// Killed at the wall-clock deadline
    Timeout,
    /// Killed after crossing the memory ceiling
    MemoryExceeded,
}

/// Everything observed while supervising one child process. The stdio
/// buffers hold whatever the child wrote before it finished or was killed.
#[derive(Debug)]
pub struct LimitedRun {
    pub status: LimitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
    pub peak_memory_bytes: u64,
}

/// Cadence of the memory sampler.
const MEMORY_POLL_INTERVAL: Duration = Duration::from_millis(10);

enum Race {
    Exited(std::process::ExitStatus),
    Deadline,
    MemoryBreach,
}

/// Supervise a spawned child: race its completion against the wall-clock
/// deadline and the memory ceiling, draining its stdio concurrently so
/// partial output survives a kill.
///
/// The child must have been spawned with piped stdout/stderr. Returns within
/// `limits.timeout` plus a small kill/reap overhead on every path.
pub async fn supervise(mut child: Child, limits: Limits) -> Result<LimitedRun> {
    let started = Instant::now();

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| RunletError::SandboxSetup("child stdout is not piped".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| RunletError::SandboxSetup("child stderr is not piped".to_string()))?;

    // Drain pipes off to the side; a full pipe would otherwise block the
    // child and deadlock the race below.
    let stdout_task = tokio::spawn(drain(stdout));
    let stderr_task = tokio::spawn(drain(stderr));

    let pid = child.id();
    let deadline = tokio::time::sleep(limits.timeout);
    tokio::pin!(deadline);
    let mut poll = tokio::time::interval(MEMORY_POLL_INTERVAL);

    let mut peak_memory_bytes = 0u64;
    let raced = loop {
        tokio::select! {
            exited = child.wait() => {
                break Race::Exited(exited?);
            }
            _ = &mut deadline => {
                break Race::Deadline;
            }
            _ = poll.tick() => {
                if let Some(pid) = pid {
                    if let Some(rss) = sample_memory(pid) {
                        peak_memory_bytes = peak_memory_bytes.max(rss);
                        if rss > limits.memory_limit_bytes {
                            break Race::MemoryBreach;
                        }
                    }
                }
            }
        }
    };

    let status = match raced {
        Race::Exited(exit) => LimitStatus::Completed {
            exit_code: exit.code().unwrap_or(-1),
        },
        Race::Deadline => {
            debug!(timeout_ms = limits.timeout.as_millis() as u64, "Deadline reached, killing child");
            let _ = child.start_kill();
            let _ = child.wait().await;
            LimitStatus::Timeout
        }
        Race::MemoryBreach => {
            debug!(limit = limits.memory_limit_bytes, "Memory ceiling crossed, killing child");
            let _ = child.start_kill();
            let _ = child.wait().await;
            LimitStatus::MemoryExceeded
        }
    };

    // Pipes close once the child is gone, so these complete promptly.
    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(LimitedRun {
        status,
        stdout,
        stderr,
        duration: started.elapsed(),
        peak_memory_bytes,
    })
}

async fn drain(mut pipe: impl AsyncRead + Unpin) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf).await;
    buf
}

/// Resident set size of `pid` in bytes, when the host exposes it.
#[cfg(target_os = "linux")]
fn sample_memory(pid: u32) -> Option<u64> {
    let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    parse_vm_rss(&status)
}

#[cfg(not(target_os = "linux"))]
fn sample_memory(_pid: u32) -> Option<u64> {
    None
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    fn limits(timeout_ms: u64) -> Limits {
        Limits {
            timeout: Duration::from_millis(timeout_ms),
            memory_limit_bytes: 256 * 1024 * 1024,
        }
    }

    fn spawn(program: &str, args: &[&str]) -> Child {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .expect("spawn test child")
    }

    #[tokio::test]
    async fn completed_child_reports_exit_and_output() {
        let child = spawn("echo", &["hello"]);
        let run = supervise(child, limits(5_000)).await.unwrap();

        assert_eq!(run.status, LimitStatus::Completed { exit_code: 0 });
        assert_eq!(String::from_utf8_lossy(&run.stdout).trim(), "hello");
        assert!(run.stderr.is_empty());
    }

    #[tokio::test]
    async fn deadline_kills_long_running_child() {
        let child = spawn("sleep", &["5"]);
        let run = supervise(child, limits(100)).await.unwrap();

        assert_eq!(run.status, LimitStatus::Timeout);
        assert!(
            run.duration < Duration::from_millis(2_000),
            "kill overhead too large: {:?}",
            run.duration
        );
    }

    #[tokio::test]
    async fn output_before_kill_is_preserved() {
        let child = spawn("sh", &["-c", "echo partial; sleep 5"]);
        let run = supervise(child, limits(200)).await.unwrap();

        assert_eq!(run.status, LimitStatus::Timeout);
        assert_eq!(String::from_utf8_lossy(&run.stdout).trim(), "partial");
    }

    #[test]
    fn vm_rss_parsing() {
        let status = "Name:\tcat\nVmPeak:\t  5000 kB\nVmRSS:\t    1234 kB\nThreads:\t1\n";
        assert_eq!(parse_vm_rss(status), Some(1234 * 1024));
        assert_eq!(parse_vm_rss("Name:\tcat\n"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn sampler_sees_current_process() {
        let rss = sample_memory(std::process::id()).unwrap();
        assert!(rss > 0);
    }
}
