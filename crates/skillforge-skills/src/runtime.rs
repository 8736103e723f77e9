//! Shell execution runtime — subprocess execution with streaming output,
//! timeouts, and abort propagation.
//!
//! Streaming contract: when an output sink is supplied, stdout and stderr
//! are read in chunks of at most 4 KiB and delivered in arrival order; the
//! same chunks accumulate into `ExecutionResult.output`, truncated with a
//! marker past 100 000 characters.
//!
//! Timeout and abort both use the graceful-then-force sequence: SIGTERM,
//! a 2-second grace window, then SIGKILL. The host process environment is
//! never mutated; injection composes (process env) ⊕ (caller-supplied env)
//! into the subprocess only.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use skillforge_core::types::ExecutionResult;

/// Streamed output chunks are delivered through this sender.
pub type OutputSink = mpsc::UnboundedSender<String>;

/// Captured output cap, in characters.
pub const MAX_CAPTURED_OUTPUT: usize = 100_000;
/// Marker appended when captured output is truncated.
pub const OUTPUT_TRUNCATION_MARKER: &str = "\n... [output truncated]";

const STREAM_CHUNK_BYTES: usize = 4096;
const TERMINATION_GRACE: Duration = Duration::from_secs(2);

// ─────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────

/// Per-execution options.
#[derive(Clone)]
pub struct ExecOptions {
    pub cwd: Option<PathBuf>,
    /// Extra env vars layered over the inherited process environment.
    pub env: HashMap<String, String>,
    /// Overrides the runtime default timeout.
    pub timeout: Option<Duration>,
    /// Streaming output sink.
    pub output: Option<OutputSink>,
    /// Abort signal; firing triggers graceful-then-force termination.
    pub cancel: Option<CancellationToken>,
    /// Capture stderr into the result (template expansion turns this off).
    pub capture_stderr: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            env: HashMap::new(),
            timeout: None,
            output: None,
            cancel: None,
            capture_stderr: true,
        }
    }
}

impl ExecOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        ExecOptions {
            timeout: Some(timeout),
            ..Default::default()
        }
    }
}

// ─────────────────────────────────────────────
// ShellRuntime
// ─────────────────────────────────────────────

/// Runs commands and scripts through a fixed shell interpreter.
pub struct ShellRuntime {
    default_timeout: Duration,
    max_output: usize,
}

impl ShellRuntime {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            default_timeout,
            max_output: MAX_CAPTURED_OUTPUT,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Execute a single shell command.
    pub async fn execute(&self, command: &str, opts: ExecOptions) -> ExecutionResult {
        debug!(command = %truncate_for_log(command), "executing command");
        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command);
            c
        };
        self.run(&mut cmd, opts).await
    }

    /// Execute a multi-line script. The body is written to a temp file that
    /// is deleted when this call returns.
    pub async fn execute_script(&self, script: &str, opts: ExecOptions) -> ExecutionResult {
        let started = Instant::now();
        let mut file = match tempfile::Builder::new()
            .prefix("skillforge-script-")
            .suffix(".sh")
            .tempfile()
        {
            Ok(f) => f,
            Err(e) => {
                return ExecutionResult::failed(
                    format!("failed to create script file: {e}"),
                    -1,
                    "",
                    elapsed_ms(started),
                )
            }
        };
        if let Err(e) = file.write_all(script.as_bytes()).and_then(|_| file.flush()) {
            return ExecutionResult::failed(
                format!("failed to write script file: {e}"),
                -1,
                "",
                elapsed_ms(started),
            );
        }

        let mut cmd = Command::new("sh");
        cmd.arg(file.path());
        // `file` stays alive until run() returns, then the temp file is removed.
        self.run(&mut cmd, opts).await
    }

    async fn run(&self, cmd: &mut Command, opts: ExecOptions) -> ExecutionResult {
        let started = Instant::now();

        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(cwd) = &opts.cwd {
            cmd.current_dir(cwd);
        }
        cmd.envs(&opts.env);

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return ExecutionResult::failed(
                    format!("failed to spawn process: {e}"),
                    -1,
                    "",
                    elapsed_ms(started),
                )
            }
        };

        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<String>();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(stdout, chunk_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            if opts.capture_stderr {
                tokio::spawn(pump(stderr, chunk_tx.clone()));
            } else {
                tokio::spawn(drain(stderr));
            }
        }
        drop(chunk_tx);

        let cancel = opts.cancel.clone().unwrap_or_default();
        let timeout = opts.timeout.unwrap_or(self.default_timeout);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let mut captured = String::new();
        let mut truncated = false;
        let mut timed_out = false;
        let mut aborted = false;

        loop {
            tokio::select! {
                chunk = chunk_rx.recv() => match chunk {
                    Some(text) => {
                        if let Some(sink) = &opts.output {
                            let _ = sink.send(text.clone());
                        }
                        append_capped(&mut captured, &text, self.max_output, &mut truncated);
                    }
                    None => break,
                },
                _ = &mut deadline => {
                    timed_out = true;
                    break;
                }
                _ = cancel.cancelled() => {
                    aborted = true;
                    break;
                }
            }
        }

        if timed_out || aborted {
            self.terminate(&mut child).await;
            while let Ok(text) = chunk_rx.try_recv() {
                append_capped(&mut captured, &text, self.max_output, &mut truncated);
            }
            let error = if aborted {
                "aborted".to_string()
            } else {
                format!("timed out after {}s", timeout.as_secs())
            };
            warn!(error = %error, "command terminated");
            return ExecutionResult::failed(
                error,
                -1,
                finalize(captured, truncated),
                elapsed_ms(started),
            );
        }

        let status = match child.wait().await {
            Ok(s) => s,
            Err(e) => {
                return ExecutionResult::failed(
                    format!("failed to reap process: {e}"),
                    -1,
                    finalize(captured, truncated),
                    elapsed_ms(started),
                )
            }
        };

        let output = finalize(captured, truncated);
        let duration_ms = elapsed_ms(started);
        if status.success() {
            ExecutionResult::succeeded(output, duration_ms)
        } else {
            let exit_code = status.code().unwrap_or(-1);
            ExecutionResult::failed(
                format!("process exited with code {exit_code}"),
                exit_code,
                output,
                duration_ms,
            )
        }
    }

    /// Graceful-then-force termination: SIGTERM, 2 s grace, SIGKILL.
    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
            if tokio::time::timeout(TERMINATION_GRACE, child.wait())
                .await
                .is_ok()
            {
                return;
            }
        }
        let _ = child.kill().await;
        let _ = child.wait().await;
    }
}

// ─────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────

async fn pump<R>(mut reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = [0u8; STREAM_CHUNK_BYTES];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                if tx.send(text).is_err() {
                    break;
                }
            }
        }
    }
}

async fn drain<R>(mut reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = [0u8; STREAM_CHUNK_BYTES];
    while matches!(reader.read(&mut buf).await, Ok(n) if n > 0) {}
}

fn append_capped(captured: &mut String, text: &str, cap: usize, truncated: &mut bool) {
    if *truncated {
        return;
    }
    captured.push_str(text);
    if captured.len() > cap {
        let mut cut = cap;
        while !captured.is_char_boundary(cut) {
            cut -= 1;
        }
        captured.truncate(cut);
        *truncated = true;
    }
}

fn finalize(mut captured: String, truncated: bool) -> String {
    if truncated {
        captured.push_str(OUTPUT_TRUNCATION_MARKER);
    }
    captured
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn truncate_for_log(command: &str) -> &str {
    if command.len() <= 120 {
        return command;
    }
    let mut cut = 120;
    while !command.is_char_boundary(cut) {
        cut -= 1;
    }
    &command[..cut]
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> ShellRuntime {
        ShellRuntime::new(Duration::from_secs(30))
    }

    #[tokio::test]
    async fn execute_captures_output() {
        let result = runtime().execute("echo hello", ExecOptions::default()).await;
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("hello"));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn execute_nonzero_exit() {
        let result = runtime().execute("exit 42", ExecOptions::default()).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, 42);
        assert!(result.error.unwrap().contains("42"));
    }

    #[tokio::test]
    async fn execute_captures_stderr() {
        let result = runtime()
            .execute("echo oops 1>&2", ExecOptions::default())
            .await;
        assert!(result.success);
        assert!(result.output.contains("oops"));
    }

    #[tokio::test]
    async fn stderr_capture_can_be_disabled() {
        let opts = ExecOptions {
            capture_stderr: false,
            ..Default::default()
        };
        let result = runtime().execute("echo visible; echo hidden 1>&2", opts).await;
        assert!(result.output.contains("visible"));
        assert!(!result.output.contains("hidden"));
    }

    #[tokio::test]
    async fn timeout_yields_failure_within_grace() {
        let started = Instant::now();
        let opts = ExecOptions::with_timeout(Duration::from_secs(1));
        let result = runtime().execute("sleep 30", opts).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        assert!(result.error.unwrap().contains("timed out"));
        // 1 s timeout + at most 2 s grace, with slack
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn abort_terminates_promptly() {
        let cancel = CancellationToken::new();
        let opts = ExecOptions {
            cancel: Some(cancel.clone()),
            ..Default::default()
        };
        let handle = {
            let rt = runtime();
            tokio::spawn(async move { rt.execute("sleep 30", opts).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        let started = Instant::now();
        cancel.cancel();

        let result = handle.await.unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.error.as_deref(), Some("aborted"));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn already_fired_abort_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let opts = ExecOptions {
            cancel: Some(cancel),
            ..Default::default()
        };
        let result = runtime().execute("sleep 30", opts).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("aborted"));
    }

    #[tokio::test]
    async fn streaming_delivers_chunks_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let opts = ExecOptions {
            output: Some(tx),
            ..Default::default()
        };
        let result = runtime()
            .execute("printf 'first\\n'; sleep 0.1; printf 'second\\n'", opts)
            .await;
        assert!(result.success);

        let mut streamed = String::new();
        while let Ok(chunk) = rx.try_recv() {
            streamed.push_str(&chunk);
        }
        let first = streamed.find("first").unwrap();
        let second = streamed.find("second").unwrap();
        assert!(first < second);
        assert!(result.output.contains("first"));
        assert!(result.output.contains("second"));
    }

    #[tokio::test]
    async fn oversize_output_truncated_with_marker_and_success() {
        let command = format!(
            "head -c {} /dev/zero | tr '\\0' 'x'",
            MAX_CAPTURED_OUTPUT + 50_000
        );
        let result = runtime().execute(&command, ExecOptions::default()).await;
        assert!(result.success);
        assert!(result.output.ends_with(OUTPUT_TRUNCATION_MARKER));
        assert_eq!(
            result.output.len(),
            MAX_CAPTURED_OUTPUT + OUTPUT_TRUNCATION_MARKER.len()
        );
    }

    #[tokio::test]
    async fn env_injection_is_scoped_to_subprocess() {
        let mut opts = ExecOptions::default();
        opts.env
            .insert("SKILLFORGE_TEST_VAR".into(), "injected".into());
        let result = runtime()
            .execute("echo value=$SKILLFORGE_TEST_VAR", opts)
            .await;
        assert!(result.output.contains("value=injected"));
        // the host process env was never touched
        assert!(std::env::var("SKILLFORGE_TEST_VAR").is_err());
    }

    #[tokio::test]
    async fn cwd_is_honoured() {
        let dir = tempfile::tempdir().unwrap();
        let opts = ExecOptions {
            cwd: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let result = runtime().execute("pwd", opts).await;
        let canonical = dir.path().canonicalize().unwrap();
        assert!(result.output.contains(canonical.to_str().unwrap()));
    }

    #[tokio::test]
    async fn script_runs_multiline_body() {
        let script = "A=1\nB=2\necho $((A + B))\n";
        let result = runtime()
            .execute_script(script, ExecOptions::default())
            .await;
        assert!(result.success);
        assert!(result.output.contains('3'));
    }

    #[tokio::test]
    async fn script_file_is_deleted_after_return() {
        let result = runtime()
            .execute_script("echo $0", ExecOptions::default())
            .await;
        assert!(result.success);
        let path = result.output.trim();
        assert!(!std::path::Path::new(path).exists());
    }

    #[tokio::test]
    async fn spawn_failure_reports_error() {
        let opts = ExecOptions {
            cwd: Some(PathBuf::from("/nonexistent/cwd/for/sure")),
            ..Default::default()
        };
        let result = runtime().execute("echo hi", opts).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("failed to spawn"));
    }

    #[test]
    fn append_capped_respects_char_boundaries() {
        let mut captured = String::new();
        let mut truncated = false;
        // 4-byte emoji straddling the cap must not split
        append_capped(&mut captured, "ab🦀cd", 5, &mut truncated);
        assert!(truncated);
        assert!(captured.is_char_boundary(captured.len()));
        assert!(captured.len() <= 5);
    }
}
