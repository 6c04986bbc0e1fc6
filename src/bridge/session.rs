// src/bridge/session.rs

//! Per-channel exec session.
//!
//! The session is a single event loop over everything that can happen to one
//! channel: transport events arriving, a stdin slot opening up, and the
//! process exiting. That loop is the per-channel serialization point:
//! environment mutation, spawning, and termination requests all happen inside
//! it, so none of them can race. The stream pumps run as separate tasks and
//! only touch their own stream.
//!
//! Inbound data is never forwarded to stdin inline from the event handler.
//! It goes through a bounded backlog that the loop drains as a separate
//! select branch, so a process that stops reading its stdin can never starve
//! control events like channel inactivity out of the loop.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

use crate::channel::{ChannelEvent, ChannelOutput, OutputStream};
use crate::glue::{StreamGlue, spawn_output_pump};
use crate::process::{self, ProcessHandle, SpawnSpec};

/// Capacity of the inbound event channel handed to the transport.
const EVENT_CHANNEL_CAPACITY: usize = 64;
/// How many data chunks may sit between the session and the stdin pump.
const STDIN_CHANNEL_CAPACITY: usize = 32;
/// Cap on bytes buffered for stdin, both before spawn and while the process
/// is not keeping up with its stdin. Overflow is dropped with a warning; the
/// transport's own flow control is expected to keep a well-behaved peer far
/// below this.
const MAX_PENDING_STDIN: usize = 1024 * 1024;
/// How long to wait for the output pumps to drain after process exit before
/// reporting the exit status anyway. A process that leaked its pipe
/// write-ends to grandchildren must not wedge the channel.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-channel knobs, normally derived from the `[exec]` config section.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Command interpreter invoked as `<shell> -c <command>`.
    pub shell: PathBuf,
    /// Informational banner written to the channel's error stream before
    /// spawn. Best-effort: a failure to write it never fails the exec.
    pub banner: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            shell: PathBuf::from("/bin/bash"),
            banner: None,
        }
    }
}

enum SessionState {
    /// No exec request seen yet.
    Idle,
    /// Exactly one process is running.
    Running(RunningProcess),
    /// The process finished or the channel is tearing down; late inbound
    /// events are dropped without error.
    Finished,
}

struct RunningProcess {
    handle: ProcessHandle,
    exit_rx: oneshot::Receiver<u32>,
    /// Feeds the stdin pump. Dropping it half-closes the process's stdin.
    stdin_tx: Option<mpsc::Sender<Vec<u8>>>,
    glue: StreamGlue,
    stderr_pump: JoinHandle<()>,
}

/// What woke the session loop up.
enum Wakeup {
    Event(Option<ChannelEvent>),
    Exited(Result<u32, oneshot::error::RecvError>),
    StdinSlot(Result<mpsc::OwnedPermit<Vec<u8>>, mpsc::error::SendError<()>>),
}

/// Wait for a send slot on the stdin pump channel, or forever when there is
/// nothing to push. Pending is what keeps the branch inert in the select.
async fn reserve_stdin_slot(
    tx: Option<mpsc::Sender<Vec<u8>>>,
) -> Result<mpsc::OwnedPermit<Vec<u8>>, mpsc::error::SendError<()>> {
    match tx {
        Some(tx) => tx.reserve_owned().await,
        None => std::future::pending().await,
    }
}

/// One exec session bound to exactly one channel for its whole lifetime.
/// Never reused.
pub struct ExecSession {
    options: SessionOptions,
    events_rx: mpsc::Receiver<ChannelEvent>,
    output_tx: mpsc::Sender<ChannelOutput>,
    env: BTreeMap<String, String>,
    pending_stdin: VecDeque<Vec<u8>>,
    pending_stdin_len: usize,
    pending_eof: bool,
    state: SessionState,
}

/// Spawn a session event loop for one channel.
///
/// Returns the event sender the transport feeds and the session task handle.
pub fn spawn_session(
    options: SessionOptions,
    output_tx: mpsc::Sender<ChannelOutput>,
) -> (mpsc::Sender<ChannelEvent>, JoinHandle<()>) {
    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let session = ExecSession::new(options, events_rx, output_tx);
    let handle = tokio::spawn(session.run());
    (events_tx, handle)
}

impl ExecSession {
    pub fn new(
        options: SessionOptions,
        events_rx: mpsc::Receiver<ChannelEvent>,
        output_tx: mpsc::Sender<ChannelOutput>,
    ) -> Self {
        Self {
            options,
            events_rx,
            output_tx,
            env: BTreeMap::new(),
            pending_stdin: VecDeque::new(),
            pending_stdin_len: 0,
            pending_eof: false,
            state: SessionState::Idle,
        }
    }

    /// Main per-channel event loop.
    pub async fn run(mut self) {
        debug!("exec session started");

        loop {
            let wakeup = match &mut self.state {
                SessionState::Running(run) => {
                    let push_tx = if self.pending_stdin.is_empty() {
                        None
                    } else {
                        run.stdin_tx.clone()
                    };
                    tokio::select! {
                        maybe = self.events_rx.recv() => Wakeup::Event(maybe),
                        res = &mut run.exit_rx => Wakeup::Exited(res),
                        slot = reserve_stdin_slot(push_tx) => Wakeup::StdinSlot(slot),
                    }
                }
                _ => Wakeup::Event(self.events_rx.recv().await),
            };

            match wakeup {
                Wakeup::Event(Some(event)) => {
                    if !self.handle_event(event).await {
                        break;
                    }
                }
                Wakeup::Event(None) => {
                    // The transport dropped the channel without an explicit
                    // inactive event; same teardown path.
                    self.handle_inactive();
                    break;
                }
                Wakeup::Exited(res) => self.handle_process_exit(res).await,
                Wakeup::StdinSlot(Ok(permit)) => self.push_stdin_chunk(permit),
                Wakeup::StdinSlot(Err(_)) => self.handle_stdin_gone(),
            }
        }

        debug!("exec session finished");
    }

    /// Returns false when the session should stop consuming events.
    async fn handle_event(&mut self, event: ChannelEvent) -> bool {
        match event {
            ChannelEvent::Environment { name, value } => {
                self.handle_environment(name, value);
                true
            }
            ChannelEvent::Exec {
                command,
                want_reply,
            } => {
                self.handle_exec(command, want_reply).await;
                true
            }
            ChannelEvent::Shell { want_reply } => {
                self.handle_shell(want_reply).await;
                true
            }
            ChannelEvent::Data(bytes) => {
                self.handle_data(bytes);
                true
            }
            ChannelEvent::Eof => {
                self.handle_eof();
                true
            }
            ChannelEvent::Unknown { description } => {
                // Explicit unhandled arm: channel-scoped failure, never
                // fatal to the session or the host.
                warn!(%description, "unhandled channel event");
                self.send(ChannelOutput::Failure).await;
                true
            }
            ChannelEvent::Inactive => {
                self.handle_inactive();
                false
            }
        }
    }

    fn handle_environment(&mut self, name: String, value: String) {
        match self.state {
            SessionState::Idle => {
                debug!(name = %name, "captured environment variable");
                self.env.insert(name, value);
            }
            _ => debug!(name = %name, "environment request after exec; ignoring"),
        }
    }

    async fn handle_exec(&mut self, command: String, want_reply: bool) {
        if !matches!(self.state, SessionState::Idle) {
            warn!(command = %command, "exec request on a busy channel; rejecting");
            self.send(ChannelOutput::Failure).await;
            return;
        }

        info!(command = %command, want_reply, "exec request");

        if let Some(banner) = &self.options.banner {
            // Best effort: a full outbound queue or a closed channel must
            // not stop the exec itself.
            let _ = self
                .output_tx
                .try_send(ChannelOutput::StderrData(banner.clone().into_bytes()));
        }

        let spec = SpawnSpec {
            shell: self.options.shell.clone(),
            command,
            env: std::mem::take(&mut self.env),
        };

        let spawned = match process::spawn(spec) {
            Ok(spawned) => spawned,
            Err(e) => {
                warn!(error = %e, "failed to spawn process");
                if want_reply {
                    self.send(ChannelOutput::Failure).await;
                }
                self.send(ChannelOutput::Close).await;
                self.state = SessionState::Finished;
                return;
            }
        };

        // "Request accepted", distinct from "command finished". Sent before
        // the pumps start so it precedes any output bytes.
        if want_reply {
            self.send(ChannelOutput::Success).await;
        }

        let (stdin_tx, stdin_rx) = mpsc::channel(STDIN_CHANNEL_CAPACITY);
        let glue = StreamGlue::couple(
            spawned.stdout,
            spawned.stdin,
            stdin_rx,
            self.output_tx.clone(),
        );
        let stderr_pump =
            spawn_output_pump(spawned.stderr, self.output_tx.clone(), OutputStream::Stderr);

        // Data buffered before the spawn stays in the backlog; the session
        // loop drains it into the pump as slots open up.
        let stdin_tx = if self.pending_eof && self.pending_stdin.is_empty() {
            // Channel data already ended; start with stdin half-closed.
            None
        } else {
            Some(stdin_tx)
        };

        self.state = SessionState::Running(RunningProcess {
            handle: spawned.handle,
            exit_rx: spawned.exit_rx,
            stdin_tx,
            glue,
            stderr_pump,
        });
    }

    async fn handle_shell(&mut self, want_reply: bool) {
        warn!("shell request received; interactive sessions are not supported");
        if want_reply {
            self.send(ChannelOutput::Failure).await;
        }
        if matches!(self.state, SessionState::Idle) {
            // Nothing will ever run on this channel; close it rather than
            // leaving the peer hanging.
            self.send(ChannelOutput::Close).await;
            self.state = SessionState::Finished;
        }
    }

    /// Buffer inbound data for stdin. Never blocks: forwarding into the
    /// pump happens from the session loop's stdin-slot branch, so control
    /// events keep flowing even when the process stops reading.
    fn handle_data(&mut self, bytes: Vec<u8>) {
        match &self.state {
            SessionState::Finished => {
                debug!(len = bytes.len(), "channel data after teardown; dropping");
                return;
            }
            SessionState::Running(run) if run.stdin_tx.is_none() => {
                debug!(len = bytes.len(), "channel data after EOF; dropping");
                return;
            }
            _ => {}
        }
        if self.pending_eof {
            debug!(len = bytes.len(), "channel data after EOF; dropping");
            return;
        }

        if self.pending_stdin_len + bytes.len() > MAX_PENDING_STDIN {
            warn!(
                len = bytes.len(),
                buffered = self.pending_stdin_len,
                "dropping channel data: stdin buffer is full"
            );
            return;
        }
        self.pending_stdin_len += bytes.len();
        self.pending_stdin.push_back(bytes);
    }

    fn handle_eof(&mut self) {
        match &self.state {
            SessionState::Finished => return,
            SessionState::Idle => {
                debug!("channel EOF before exec; stdin will start half-closed");
            }
            SessionState::Running(_) => {
                debug!("channel EOF; half-closing process stdin once drained");
            }
        }
        self.pending_eof = true;
        self.close_stdin_if_drained();
    }

    /// Move the front backlog chunk into the reserved stdin pump slot.
    fn push_stdin_chunk(&mut self, permit: mpsc::OwnedPermit<Vec<u8>>) {
        if let Some(chunk) = self.pending_stdin.pop_front() {
            self.pending_stdin_len -= chunk.len();
            // The returned sender clone is dropped; the canonical sender
            // stays in RunningProcess.
            let _ = permit.send(chunk);
        }
        self.close_stdin_if_drained();
    }

    /// The stdin pump dropped its receiver (process stdin closed early).
    /// Nothing buffered can be delivered anymore.
    fn handle_stdin_gone(&mut self) {
        debug!("stdin pump gone; dropping buffered channel data");
        self.clear_stdin_backlog();
        if let SessionState::Running(run) = &mut self.state {
            run.stdin_tx.take();
        }
    }

    /// After a channel EOF, the pump sender is dropped only once the backlog
    /// has fully drained, so buffered bytes still reach the process first.
    fn close_stdin_if_drained(&mut self) {
        if self.pending_eof && self.pending_stdin.is_empty() {
            if let SessionState::Running(run) = &mut self.state {
                run.stdin_tx.take();
            }
        }
    }

    fn clear_stdin_backlog(&mut self) {
        self.pending_stdin.clear();
        self.pending_stdin_len = 0;
    }

    fn handle_inactive(&mut self) {
        if let SessionState::Running(run) = &mut self.state {
            info!("channel inactive with process still running; requesting termination");
            // Non-blocking; the supervisor owns reclamation from here and
            // exit confirmation is not awaited.
            run.handle.terminate();
            run.stdin_tx.take();
        } else {
            debug!("channel inactive");
        }
        self.clear_stdin_backlog();
        self.state = SessionState::Finished;
    }

    async fn handle_process_exit(&mut self, result: Result<u32, oneshot::error::RecvError>) {
        let run = match std::mem::replace(&mut self.state, SessionState::Finished) {
            SessionState::Running(run) => run,
            // Exit is only awaited while running.
            other => {
                self.state = other;
                return;
            }
        };

        let code = match result {
            Ok(code) => code,
            Err(_) => {
                warn!("process exit notification lost; reporting abnormal status");
                255
            }
        };

        // Half-close stdin and let the output pumps drain what the process
        // wrote before exiting, so the exit status is the last thing the
        // channel sees. Undelivered stdin is moot now.
        self.clear_stdin_backlog();
        drop(run.stdin_tx);
        let drained = timeout(DRAIN_TIMEOUT, async {
            run.glue.join().await;
            let _ = run.stderr_pump.await;
        })
        .await;
        if drained.is_err() {
            warn!("output pumps did not drain in time; reporting exit status anyway");
        }

        info!(code, "process exited; reporting exit status");
        self.send(ChannelOutput::ExitStatus(code)).await;
        self.send(ChannelOutput::Close).await;
    }

    async fn send(&self, output: ChannelOutput) {
        // A closed receiver means the transport is gone; there is nobody
        // left to report to.
        if self.output_tx.send(output).await.is_err() {
            debug!("channel output receiver dropped");
        }
    }
}
