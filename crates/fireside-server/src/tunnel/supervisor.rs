//! Supervision of the external tunnel process.
//!
//! Runs one long-lived child at a time, scans its output for public URLs,
//! and respawns it with exponential backoff until cancelled.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::BackoffPolicy;
use super::error::TunnelError;
use super::provider::UrlSender;

/// Extracts a public URL from one line of process output.
pub type UrlExtractor = fn(&str) -> Option<String>;

/// What to do with the child's stdout/stderr.
#[derive(Clone, Copy)]
pub enum OutputMode {
    /// Pipe both streams and forward every URL the extractor finds.
    Scan(UrlExtractor),
    /// Send both streams to the null device.
    Discard,
}

/// Program and arguments for one tunnel invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Resolve a tunnel binary the way a shell would.
///
/// Names containing a path separator are checked directly; bare names are
/// searched on `PATH`.
pub fn resolve_binary(binary: &str) -> Option<PathBuf> {
    let candidate = Path::new(binary);
    if candidate.is_absolute() || candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(binary))
        .find(|p| is_executable(p))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

#[derive(Default)]
struct SupervisorState {
    /// Token governing the current run loop; `stop()` takes and cancels it.
    run: Option<CancellationToken>,
    /// Bumped on every launch to tell run loops apart.
    generation: u64,
    /// Generation and PID of the live child, if one is running.
    pid: Option<(u64, u32)>,
}

struct Inner {
    label: &'static str,
    output: OutputMode,
    backoff: BackoffPolicy,
    state: Mutex<SupervisorState>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, SupervisorState> {
        // A poisoned lock only means a panic elsewhere; the state is still
        // plain data.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set_pid(&self, generation: u64, pid: Option<u32>) {
        self.state().pid = pid.map(|pid| (generation, pid));
    }

    /// Forget the PID only if it still belongs to `generation`; a newer
    /// launch may already have recorded its own child.
    fn clear_pid(&self, generation: u64) {
        let mut state = self.state();
        if state.pid.is_some_and(|(owner, _)| owner == generation) {
            state.pid = None;
        }
    }
}

/// Supervises a single external tunnel process.
///
/// Cloning yields another handle to the same supervisor.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new(label: &'static str, output: OutputMode, backoff: BackoffPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                label,
                output,
                backoff,
                state: Mutex::new(SupervisorState::default()),
            }),
        }
    }

    /// Launch the retry loop in the background under a child of `parent`.
    ///
    /// A loop already running from an earlier launch is cancelled first, so
    /// at most one process exists per supervisor.
    pub fn launch(&self, invocation: Invocation, parent: &CancellationToken, events: UrlSender) {
        let run = parent.child_token();
        let (previous, generation) = {
            let mut state = self.inner.state();
            state.generation += 1;
            (state.run.replace(run.clone()), state.generation)
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
        tokio::spawn(run_loop(
            Arc::clone(&self.inner),
            invocation,
            generation,
            run,
            events,
        ));
    }

    /// Cancel the current run, killing the child. Idempotent.
    pub fn stop(&self) {
        let run = self.inner.state().run.take();
        if let Some(run) = run {
            debug!(tunnel = self.inner.label, "Stopping tunnel process");
            run.cancel();
        }
    }

    /// Whether a child process is currently alive.
    pub fn is_running(&self) -> bool {
        self.inner.state().pid.is_some()
    }
}

/// Respawn loop. Returns (closing the event channel) once `cancel` fires.
async fn run_loop(
    inner: Arc<Inner>,
    invocation: Invocation,
    generation: u64,
    cancel: CancellationToken,
    events: UrlSender,
) {
    let mut backoff = inner.backoff.start();

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let result = run_once(&inner, &invocation, generation, &cancel, &events).await;

        if cancel.is_cancelled() {
            break;
        }

        let delay = backoff.next_delay();
        match result {
            Ok(status) => info!(
                tunnel = inner.label,
                %status,
                retry_in_ms = delay.as_millis(),
                "Tunnel process exited, respawning"
            ),
            Err(e) => warn!(
                tunnel = inner.label,
                error = %e,
                retry_in_ms = delay.as_millis(),
                "Tunnel process failed, respawning"
            ),
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = sleep(delay) => {}
        }
    }

    debug!(tunnel = inner.label, "Tunnel run loop finished");
}

/// Spawn the child once and wait for it to exit or for cancellation.
async fn run_once(
    inner: &Inner,
    invocation: &Invocation,
    generation: u64,
    cancel: &CancellationToken,
    events: &UrlSender,
) -> Result<ExitStatus, TunnelError> {
    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    match inner.output {
        OutputMode::Scan(_) => cmd.stdout(Stdio::piped()).stderr(Stdio::piped()),
        OutputMode::Discard => cmd.stdout(Stdio::null()).stderr(Stdio::null()),
    };

    let mut child = cmd
        .spawn()
        .map_err(|e| TunnelError::Spawn(format!("{}: {e}", invocation.program.display())))?;
    inner.set_pid(generation, child.id());
    debug!(tunnel = inner.label, pid = ?child.id(), "Tunnel process started");

    if let OutputMode::Scan(extract) = inner.output {
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(scan_output(
                stdout,
                extract,
                events.clone(),
                cancel.clone(),
                inner.label,
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(scan_output(
                stderr,
                extract,
                events.clone(),
                cancel.clone(),
                inner.label,
            ));
        }
    }

    let outcome = tokio::select! {
        status = child.wait() => status.map_err(|e| TunnelError::Exited(e.to_string())),
        () = cancel.cancelled() => {
            if let Err(e) = child.kill().await {
                debug!(tunnel = inner.label, error = %e, "Kill after cancellation failed");
            }
            Err(TunnelError::Exited("cancelled".into()))
        }
    };
    inner.clear_pid(generation);

    let status = outcome?;
    if status.success() {
        Ok(status)
    } else {
        Err(TunnelError::Exited(status.to_string()))
    }
}

/// Read lines until EOF or cancellation, forwarding recognised URLs.
///
/// Lines are decoded lossily so stray non-UTF-8 bytes never end the scan.
/// Sends never block: a URL the receiver has no room for is dropped.
async fn scan_output<R>(
    stream: R,
    extract: UrlExtractor,
    events: UrlSender,
    cancel: CancellationToken,
    label: &'static str,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = tokio::select! {
            () = cancel.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read,
        };
        match read {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if let Some(url) = extract(&line) {
                    debug!(tunnel = label, url = %url, "Tunnel reported public URL");
                    if events.try_send(url).is_err() {
                        debug!(tunnel = label, "URL event dropped, receiver busy");
                    }
                }
            }
            Err(e) => {
                debug!(tunnel = label, error = %e, "Tunnel output read failed");
                break;
            }
        }
    }
}
