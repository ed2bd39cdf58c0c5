//! Ownership of a running tool server process.
//!
//! A monitor task owns the `Child`. It waits for the process to exit on its
//! own or for a stop request, marks the connection `Dead` when the process
//! is gone, and publishes the exit through a watch channel.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::sync::{oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use toolhub_core::ConnectionState;

use super::shutdown::terminate;

/// Stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Grace used when the handle is dropped without an explicit stop.
const DROP_GRACE: Duration = Duration::from_secs(2);

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, `None` when killed by a signal or unknown.
    pub code: Option<i32>,
    /// Whether the exit followed a stop request.
    pub requested: bool,
}

/// Handle to a supervised child process.
pub struct ProcessHandle {
    pid: Option<u32>,
    exit: watch::Receiver<Option<ExitInfo>>,
    stop_tx: StdMutex<Option<oneshot::Sender<Duration>>>,
    stderr_tail: Arc<StdMutex<VecDeque<String>>>,
}

impl ProcessHandle {
    /// Take ownership of `child` and start monitoring it.
    ///
    /// `state` is set to `Dead` as soon as the process exits. The child's
    /// stderr, if piped, is forwarded to tracing at debug level.
    pub fn monitor(
        server_name: &str,
        mut child: Child,
        state: Arc<watch::Sender<ConnectionState>>,
    ) -> Self {
        let pid = child.id();
        let stderr_tail = Arc::new(StdMutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(
                server_name.to_string(),
                stderr,
                Arc::clone(&stderr_tail),
            ));
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(watch_child(
            server_name.to_string(),
            child,
            stop_rx,
            state,
            exit_tx,
        ));

        Self {
            pid,
            exit: exit_rx,
            stop_tx: StdMutex::new(Some(stop_tx)),
            stderr_tail,
        }
    }

    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process is still running.
    pub fn is_running(&self) -> bool {
        self.exit.borrow().is_none()
    }

    pub fn exit_info(&self) -> Option<ExitInfo> {
        *self.exit.borrow()
    }

    /// Most recent stderr lines, oldest first.
    pub fn stderr_tail(&self) -> Vec<String> {
        self.stderr_tail
            .lock()
            .map(|tail| tail.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Terminate the process and wait until it has been reaped.
    ///
    /// Idempotent: later calls just wait for the exit.
    pub async fn stop(&self, grace: Duration) {
        let sender = self.stop_tx.lock().ok().and_then(|mut slot| slot.take());
        if let Some(sender) = sender {
            // The monitor may already be gone if the process exited.
            let _ = sender.send(grace);
        }

        let mut exit = self.exit.clone();
        let bound = grace + Duration::from_secs(5);
        if timeout(bound, exit.wait_for(Option::is_some)).await.is_err() {
            warn!(pid = ?self.pid, "Process did not exit within shutdown bound");
        }
    }
}

async fn watch_child(
    server_name: String,
    mut child: Child,
    mut stop_rx: oneshot::Receiver<Duration>,
    state: Arc<watch::Sender<ConnectionState>>,
    exit_tx: watch::Sender<Option<ExitInfo>>,
) {
    let stop_grace = tokio::select! {
        status = child.wait() => {
            finish(&server_name, &state, &exit_tx, status.ok().and_then(|s| s.code()), false);
            return;
        }
        grace = &mut stop_rx => grace.unwrap_or(DROP_GRACE),
    };

    let code = match terminate(&mut child, stop_grace).await {
        Ok(status) => status.code(),
        Err(e) => {
            warn!(server_name = %server_name, error = %e, "Failed to terminate tool server");
            None
        }
    };
    finish(&server_name, &state, &exit_tx, code, true);
}

fn finish(
    server_name: &str,
    state: &watch::Sender<ConnectionState>,
    exit_tx: &watch::Sender<Option<ExitInfo>>,
    code: Option<i32>,
    requested: bool,
) {
    state.send_if_modified(|current| {
        if current.is_dead() {
            return false;
        }
        *current = ConnectionState::Dead;
        true
    });

    if requested {
        info!(server_name = %server_name, exit_code = ?code, "Tool server stopped");
    } else {
        warn!(server_name = %server_name, exit_code = ?code, "Tool server exited");
    }

    exit_tx.send_replace(Some(ExitInfo { code, requested }));
}

async fn forward_stderr(
    server_name: String,
    stderr: ChildStderr,
    tail: Arc<StdMutex<VecDeque<String>>>,
) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if line.is_empty() {
                    continue;
                }
                debug!(server_name = %server_name, line = %line, "Server stderr");
                if let Ok(mut tail) = tail.lock() {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            Err(e) => {
                debug!(server_name = %server_name, error = %e, "Stopped reading server stderr");
                break;
            }
        }
    }
}
