// src/process/supervisor.rs

//! Single-process supervision.
//!
//! The supervisor exclusively owns the OS process once spawned: a waiter task
//! holds the `Child`, answers termination requests, and reports the exit
//! status exactly once through a oneshot. Callers keep only the pipe ends and
//! a [`ProcessHandle`].

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// What to launch: `<shell> -c <command>` with a fully captured environment.
///
/// The captured environment *replaces* the inherited one; a channel that
/// never sent environment requests runs its command with an empty
/// environment.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub shell: PathBuf,
    pub command: String,
    pub env: BTreeMap<String, String>,
}

/// A freshly spawned process: the three pipe ends plus its control handle
/// and the one-shot exit notification.
pub struct SpawnedProcess {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
    pub handle: ProcessHandle,
    pub exit_rx: oneshot::Receiver<u32>,
}

/// Control handle for a supervised process.
///
/// `terminate` never blocks and never waits for exit confirmation; the exit
/// status still arrives through the oneshot given out at spawn time.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    terminate_tx: mpsc::Sender<()>,
}

impl ProcessHandle {
    /// Request termination. Idempotent: calling this repeatedly, or after
    /// the process already exited, is a no-op.
    pub fn terminate(&self) {
        // Full or closed both mean a request is already in flight or the
        // process is gone.
        let _ = self.terminate_tx.try_send(());
    }
}

/// Launch one process and put it under supervision.
pub fn spawn(spec: SpawnSpec) -> io::Result<SpawnedProcess> {
    debug!(
        shell = %spec.shell.display(),
        command = %spec.command,
        env_vars = spec.env.len(),
        "spawning process"
    );

    let mut cmd = Command::new(&spec.shell);
    cmd.arg("-c")
        .arg(&spec.command)
        .env_clear()
        .envs(&spec.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;

    // If any pipe is missing the child is dropped here and reaped via
    // kill_on_drop, so a stream-setup failure never orphans the process.
    let stdin = take_pipe(child.stdin.take(), "stdin")?;
    let stdout = take_pipe(child.stdout.take(), "stdout")?;
    let stderr = take_pipe(child.stderr.take(), "stderr")?;

    let (handle, exit_rx) = supervise(child);

    Ok(SpawnedProcess {
        stdin,
        stdout,
        stderr,
        handle,
        exit_rx,
    })
}

/// Attach a waiter task to an already-spawned child.
///
/// The child must have had any needed stdio pipes taken out beforehand; the
/// waiter owns it from here on.
pub fn supervise(mut child: Child) -> (ProcessHandle, oneshot::Receiver<u32>) {
    let (terminate_tx, mut terminate_rx) = mpsc::channel::<()>(1);
    let (exit_tx, exit_rx) = oneshot::channel::<u32>();

    tokio::spawn(async move {
        let mut terminate_open = true;
        let status = loop {
            tokio::select! {
                res = child.wait() => break res,
                req = terminate_rx.recv(), if terminate_open => match req {
                    Some(()) => {
                        debug!("termination requested; killing process");
                        if let Err(e) = child.start_kill() {
                            // Racing with a natural exit.
                            debug!(error = %e, "kill request after process exit");
                        }
                    }
                    None => terminate_open = false,
                },
            }
        };

        let code = match status {
            Ok(status) => exit_code_of(status),
            Err(e) => {
                warn!(error = %e, "waiting for process failed");
                255
            }
        };

        debug!(code, "process terminated");
        if exit_tx.send(code).is_err() {
            debug!("exit status receiver dropped before delivery");
        }
    });

    (ProcessHandle { terminate_tx }, exit_rx)
}

/// Translate an OS exit status into the single integer reported upstream.
///
/// Normal exits map to their exit code. A signal-killed process maps to
/// `128 + signal`, the convention shells use for `$?`.
pub fn exit_code_of(status: std::process::ExitStatus) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal as u32;
        }
    }
    status.code().unwrap_or(255) as u32
}

fn take_pipe<T>(pipe: Option<T>, name: &str) -> io::Result<T> {
    pipe.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::BrokenPipe,
            format!("child {name} pipe was not captured"),
        )
    })
}
