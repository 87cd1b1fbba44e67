//! Process execution with wall-clock and memory enforcement
//!
//! Spawns one subprocess per request, captures its streams, and polls a
//! fixed-interval timer to enforce the wall-clock limit and sample resident
//! memory. Ordinary process failure (non-zero exit, timeout, memory kill) is
//! reported in the result; only a failure to spawn at all is an error.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, trace, warn};

use crate::error::SpawnError;

/// Interval between memory samples and deadline checks
pub const MEMORY_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Grace period between SIGTERM and SIGKILL escalation
const KILL_GRACE: Duration = Duration::from_millis(250);

/// Where the child's stdin comes from
#[derive(Debug, Clone)]
pub enum StdinSource {
    /// No input
    Null,
    /// Bytes written through a pipe
    Piped(String),
    /// Redirected from a file on disk
    File(PathBuf),
}

/// Where the child's stdout goes
#[derive(Debug, Clone)]
pub enum StdoutSink {
    /// Captured into the result
    Capture,
    /// Redirected to a file on disk
    File(PathBuf),
}

/// One subprocess invocation. Built fresh per spawn, never reused.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Program followed by its arguments
    pub command: Vec<String>,
    pub stdin: StdinSource,
    pub stdout: StdoutSink,
    /// Wall-clock limit
    pub time_limit: Duration,
    /// Peak-RSS limit in KB (None disables the check)
    pub memory_limit_kb: Option<u64>,
}

impl ExecutionRequest {
    pub fn new(command: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            stdin: StdinSource::Null,
            stdout: StdoutSink::Capture,
            time_limit: Duration::from_secs(30),
            memory_limit_kb: None,
        }
    }

    pub fn with_stdin(mut self, stdin: StdinSource) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn with_stdout(mut self, stdout: StdoutSink) -> Self {
        self.stdout = stdout;
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = limit;
        self
    }

    pub fn with_memory_limit_kb(mut self, limit: Option<u64>) -> Self {
        self.memory_limit_kb = limit;
        self
    }
}

/// Outcome of one subprocess invocation
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Exit code (-1 when killed by a signal)
    pub exit_code: i32,
    /// Captured stdout (empty when redirected to a file)
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Elapsed wall-clock time
    pub wall_time: Duration,
    /// Peak resident set observed by the sampler, in KB
    pub peak_memory_kb: Option<u64>,
    /// The wall-clock limit fired
    pub timed_out: bool,
    /// The memory limit fired
    pub memory_exceeded: bool,
}

impl ExecutionResult {
    /// Clean run: exited 0 with no limit fired
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out && !self.memory_exceeded
    }
}

/// Run a request to completion, enforcing its limits.
///
/// The child runs in its own process group so the whole tree can be
/// terminated together; any stragglers are swept with SIGKILL after the
/// child is reaped.
pub async fn execute(request: &ExecutionRequest) -> Result<ExecutionResult, SpawnError> {
    let program = request
        .command
        .first()
        .cloned()
        .unwrap_or_default();
    if program.is_empty() {
        return Err(SpawnError {
            program,
            message: "empty command".into(),
        });
    }

    debug!("Executing {:?}", request.command);

    let spawn_err = |message: String| SpawnError {
        program: program.clone(),
        message,
    };

    let mut cmd = Command::new(&program);
    cmd.args(&request.command[1..]);
    cmd.kill_on_drop(true);
    cmd.process_group(0);
    cmd.stderr(Stdio::piped());

    match &request.stdin {
        StdinSource::Null => {
            cmd.stdin(Stdio::null());
        }
        StdinSource::Piped(_) => {
            cmd.stdin(Stdio::piped());
        }
        StdinSource::File(path) => {
            let file = std::fs::File::open(path)
                .map_err(|e| spawn_err(format!("cannot open stdin file {}: {}", path.display(), e)))?;
            cmd.stdin(Stdio::from(file));
        }
    }

    match &request.stdout {
        StdoutSink::Capture => {
            cmd.stdout(Stdio::piped());
        }
        StdoutSink::File(path) => {
            let file = std::fs::File::create(path).map_err(|e| {
                spawn_err(format!("cannot create stdout file {}: {}", path.display(), e))
            })?;
            cmd.stdout(Stdio::from(file));
        }
    }

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|e| spawn_err(e.to_string()))?;
    let pid = child.id();

    // Feed stdin from a separate task so a full pipe cannot deadlock us
    if let StdinSource::Piped(input) = &request.stdin {
        if let Some(mut stdin) = child.stdin.take() {
            let input = input.clone();
            tokio::spawn(async move {
                // The child may exit without reading; a broken pipe is fine
                let _ = stdin.write_all(input.as_bytes()).await;
                let _ = stdin.shutdown().await;
            });
        }
    }

    // Drain both streams concurrently while the child runs
    let stdout_task = child.stdout.take().map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf).await;
            buf
        })
    });
    let stderr_task = child.stderr.take().map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf).await;
            buf
        })
    });

    let mut peak_memory_kb: Option<u64> = None;
    let mut timed_out = false;
    let mut memory_exceeded = false;
    // Instant the group was sent SIGTERM, for SIGKILL escalation
    let mut term_sent_at: Option<Instant> = None;

    let mut poll = tokio::time::interval(MEMORY_POLL_INTERVAL);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let exit_status = loop {
        tokio::select! {
            status = child.wait() => {
                break status.map_err(|e| spawn_err(format!("wait failed: {}", e)))?;
            }
            _ = poll.tick() => {
                let now = Instant::now();

                if let Some(pid) = pid {
                    if let Some(rss) = sample_rss_kb(pid) {
                        trace!("pid {} rss {} KB", pid, rss);
                        peak_memory_kb = Some(peak_memory_kb.map_or(rss, |p| p.max(rss)));

                        if let Some(limit) = request.memory_limit_kb {
                            if rss > limit && !memory_exceeded && !timed_out {
                                memory_exceeded = true;
                                terminate_group(pid, &mut term_sent_at);
                            }
                        }
                    }
                }

                if !memory_exceeded
                    && !timed_out
                    && now.duration_since(start) >= request.time_limit
                {
                    timed_out = true;
                    if let Some(pid) = pid {
                        terminate_group(pid, &mut term_sent_at);
                    }
                }

                // A process ignoring SIGTERM gets SIGKILL after the grace period
                if let (Some(sent), Some(pid)) = (term_sent_at, pid) {
                    if now.duration_since(sent) >= KILL_GRACE {
                        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
                    }
                }
            }
        }
    };

    let wall_time = start.elapsed();

    // Sweep any children the process left behind in its group
    if let Some(pid) = pid {
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }

    let stdout = match stdout_task {
        Some(task) => String::from_utf8_lossy(&task.await.unwrap_or_default()).into_owned(),
        None => String::new(),
    };
    let stderr = match stderr_task {
        Some(task) => String::from_utf8_lossy(&task.await.unwrap_or_default()).into_owned(),
        None => String::new(),
    };

    let exit_code = exit_status.code().unwrap_or(-1);
    if timed_out || memory_exceeded {
        debug!(
            "Process {:?} terminated: timed_out={}, memory_exceeded={}, wall_time={:?}",
            program, timed_out, memory_exceeded, wall_time
        );
    }

    Ok(ExecutionResult {
        exit_code,
        stdout,
        stderr,
        wall_time,
        peak_memory_kb,
        timed_out,
        memory_exceeded,
    })
}

/// Ask the child's process group to stop, once
fn terminate_group(pid: u32, term_sent_at: &mut Option<Instant>) {
    if term_sent_at.is_some() {
        return;
    }
    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!("killpg({}) failed: {}", pid, e);
    }
    *term_sent_at = Some(Instant::now());
}

/// Read the current resident set of a process from /proc, in KB
fn sample_rss_kb(pid: u32) -> Option<u64> {
    let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            return rest.trim().trim_end_matches("kB").trim().parse().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sh(script: &str) -> ExecutionRequest {
        ExecutionRequest::new(["sh", "-c", script])
    }

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let result = execute(&sh("echo hello")).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.is_success());
        assert_eq!(result.stdout.trim(), "hello");
        assert!(!result.timed_out);
        assert!(!result.memory_exceeded);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let result = execute(&sh("echo oops >&2; exit 3")).await.unwrap();
        assert_eq!(result.exit_code, 3);
        assert!(!result.is_success());
        assert_eq!(result.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_piped_stdin() {
        let request = sh("cat").with_stdin(StdinSource::Piped("1 2 3\n".into()));
        let result = execute(&request).await.unwrap();
        assert_eq!(result.stdout, "1 2 3\n");
    }

    #[tokio::test]
    async fn test_wall_clock_timeout() {
        let request = sh("sleep 5").with_time_limit(Duration::from_millis(200));
        let result = execute(&request).await.unwrap();
        assert!(result.timed_out);
        assert!(!result.memory_exceeded);
        assert!(result.wall_time >= Duration::from_millis(200));
        assert!(result.wall_time < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_memory_kill_takes_precedence_over_timeout() {
        // The shell loads ~20 MB into a variable, then idles; the sampler
        // must catch the limit long before the 4 s deadline.
        let request = sh("x=$(head -c 20000000 /dev/zero | tr '\\0' a); sleep 5")
            .with_time_limit(Duration::from_secs(4))
            .with_memory_limit_kb(Some(8 * 1024));
        let result = execute(&request).await.unwrap();
        assert!(result.memory_exceeded);
        assert!(!result.timed_out);
        assert!(result.wall_time < Duration::from_secs(4));
        assert!(result.peak_memory_kb.unwrap() > 8 * 1024);
    }

    #[tokio::test]
    async fn test_spawn_error_for_missing_program() {
        let request = ExecutionRequest::new(["/nonexistent/program"]);
        let err = execute(&request).await.unwrap_err();
        assert_eq!(err.program, "/nonexistent/program");
    }

    #[tokio::test]
    async fn test_file_redirection() {
        let mut input = NamedTempFile::new().unwrap();
        writeln!(input, "redirected").unwrap();
        let output = NamedTempFile::new().unwrap();

        let request = sh("cat")
            .with_stdin(StdinSource::File(input.path().to_path_buf()))
            .with_stdout(StdoutSink::File(output.path().to_path_buf()));
        let result = execute(&request).await.unwrap();

        assert!(result.is_success());
        assert!(result.stdout.is_empty());
        let written = std::fs::read_to_string(output.path()).unwrap();
        assert_eq!(written.trim(), "redirected");
    }
}
