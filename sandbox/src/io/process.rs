//! Helpers for running child processes with timeouts and bounded output.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How long reader threads may keep draining after the process group is gone.
///
/// A descendant that escaped the group can hold the pipes open indefinitely;
/// past this point the bytes read so far are returned without waiting for EOF.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Captured child process output.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// `None` when the child was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    /// The child outlived `timeout` and was killed.
    pub timed_out: bool,
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Stdin is always closed. Output is read concurrently while the child runs.
/// `output_limit_bytes` bounds the amount of stdout/stderr stored in memory
/// (bytes beyond this are discarded while still draining the pipe).
///
/// On unix the child leads its own process group. Whatever is left of that
/// group once the child exits or times out is killed, so background
/// descendants never outlive the call.
#[instrument(skip_all, fields(timeout_ms = timeout.as_millis() as u64, output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_reader = StreamReader::spawn(stdout, output_limit_bytes);
    let stderr_reader = StreamReader::spawn(stderr, output_limit_bytes);

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => {
            kill_process_group(&child);
            status
        }
        None => {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "command timed out, killing"
            );
            timed_out = true;
            kill_process_group(&child);
            if let Err(err) = child.kill() {
                warn!(err = %err, "kill failed, child may have exited already");
            }
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = stdout_reader.join("stdout");
    let (stderr, stderr_truncated) = stderr_reader.join("stderr");

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        exit_code: status.code(),
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// SIGKILL every process left in the child's group.
#[cfg(unix)]
fn kill_process_group(child: &Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(pgid) = i32::try_from(child.id()) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) => debug!(pgid, "process group killed"),
        Err(Errno::ESRCH) => {}
        Err(err) => warn!(pgid, err = %err, "failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

/// Output captured so far: kept bytes and the count of discarded bytes.
#[derive(Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: usize,
}

/// A pipe drained on its own thread into a shared buffer.
struct StreamReader {
    captured: Arc<Mutex<Captured>>,
    done: mpsc::Receiver<Result<()>>,
}

impl StreamReader {
    fn spawn<R: Read + Send + 'static>(reader: R, limit: usize) -> Self {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let (tx, done) = mpsc::sync_channel(1);
        let sink = Arc::clone(&captured);
        thread::spawn(move || {
            // The receiver may have given up on us; nothing to do then.
            let _ = tx.send(read_stream_limited(reader, limit, &sink));
        });
        Self { captured, done }
    }

    /// Wait up to [`DRAIN_TIMEOUT`] for EOF, then take whatever was read.
    fn join(self, label: &str) -> (Vec<u8>, usize) {
        match self.done.recv_timeout(DRAIN_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(stream = label, err = %err, "output reader failed"),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    stream = label,
                    "output still open after child exit, keeping partial output"
                );
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                warn!(stream = label, "output reader thread panicked");
            }
        }
        match self.captured.lock() {
            Ok(mut captured) => {
                let captured = std::mem::take(&mut *captured);
                (captured.bytes, captured.truncated)
            }
            Err(_) => (Vec::new(), 0),
        }
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize, sink: &Mutex<Captured>) -> Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let mut captured = sink.lock().map_err(|_| anyhow!("output buffer poisoned"))?;
        let remaining = limit.saturating_sub(captured.bytes.len());
        let keep = n.min(remaining);
        captured.bytes.extend_from_slice(&chunk[..keep]);
        captured.truncated += n - keep;
    }

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdout_and_stderr() {
        let output = run_command_with_timeout(
            sh("printf out; printf err >&2; exit 3"),
            Duration::from_secs(5),
            1024,
        )
        .expect("run");
        assert_eq!(output.stdout, b"out");
        assert_eq!(output.stderr, b"err");
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.timed_out);
    }

    #[test]
    fn kills_on_timeout() {
        let started = Instant::now();
        let output =
            run_command_with_timeout(sh("exec sleep 30"), Duration::from_millis(200), 1024)
                .expect("run");
        assert!(output.timed_out);
        assert_eq!(output.exit_code, None);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn truncates_output_beyond_limit() {
        let output =
            run_command_with_timeout(sh("printf abcdef"), Duration::from_secs(5), 4).expect("run");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stdout_truncated, 2);
    }

    #[test]
    fn stdin_is_closed() {
        let output = run_command_with_timeout(sh("cat; echo done"), Duration::from_secs(5), 1024)
            .expect("run");
        assert_eq!(output.stdout, b"done\n");
        assert!(!output.timed_out);
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let err = run_command_with_timeout(
            Command::new("/nonexistent/interpreter"),
            Duration::from_secs(1),
            16,
        )
        .expect_err("spawn");
        assert!(format!("{err:#}").contains("spawn command"));
    }

    #[test]
    fn background_descendants_do_not_hold_the_call() {
        let started = Instant::now();
        let output = run_command_with_timeout(
            sh("sleep 30 & printf done"),
            Duration::from_secs(5),
            1024,
        )
        .expect("run");
        assert_eq!(output.stdout, b"done");
        assert!(!output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn timeout_kills_the_whole_process_group() {
        let output = run_command_with_timeout(
            sh("sleep 30 & echo $!; wait"),
            Duration::from_millis(300),
            1024,
        )
        .expect("run");
        assert!(output.timed_out);
        let pid = String::from_utf8_lossy(&output.stdout).trim().to_string();
        assert!(!pid.is_empty(), "background pid not captured");

        let stat = std::path::PathBuf::from(format!("/proc/{pid}/stat"));
        let deadline = Instant::now() + Duration::from_secs(3);
        let gone = loop {
            match std::fs::read_to_string(&stat) {
                Err(_) => break true,
                Ok(contents) if contents.contains(") Z ") => break true,
                Ok(_) if Instant::now() > deadline => break false,
                Ok(_) => std::thread::sleep(Duration::from_millis(50)),
            }
        };
        assert!(gone, "background sleep {pid} survived the timeout");
    }

    #[test]
    fn partial_output_survives_an_unclosed_pipe() {
        let reader = StreamReader::spawn(OpenAfterPrefix(Some(b"report\n")), 64);
        let (bytes, truncated) = reader.join("stdout");
        assert_eq!(bytes, b"report\n");
        assert_eq!(truncated, 0);
    }

    /// Yields a prefix, then blocks as if a descendant still held the pipe.
    struct OpenAfterPrefix(Option<&'static [u8]>);

    impl Read for OpenAfterPrefix {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.0.take() {
                Some(prefix) => {
                    buf[..prefix.len()].copy_from_slice(prefix);
                    Ok(prefix.len())
                }
                None => {
                    thread::sleep(Duration::from_secs(5));
                    Ok(0)
                }
            }
        }
    }
}
