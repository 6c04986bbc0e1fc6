#![allow(dead_code)]

use execbridge::bridge::{SessionOptions, spawn_session};
use execbridge::channel::{ChannelEvent, ChannelOutput};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::with_timeout;

/// Test harness around one exec session: feeds it channel events and
/// collects everything it emits.
///
/// The default shell is `/bin/sh`. The spawned commands run with an empty
/// environment unless the test sends environment events, so commands should
/// stick to shell builtins (`echo`, `read`, `exit`, ...).
pub struct SessionHarness {
    events: mpsc::Sender<ChannelEvent>,
    output_rx: mpsc::Receiver<ChannelOutput>,
    session: JoinHandle<()>,
}

impl SessionHarness {
    pub fn start() -> Self {
        Self::start_with(SessionOptions {
            shell: "/bin/sh".into(),
            banner: None,
        })
    }

    pub fn start_with(options: SessionOptions) -> Self {
        let (output_tx, output_rx) = mpsc::channel(64);
        let (events, session) = spawn_session(options, output_tx);
        Self {
            events,
            output_rx,
            session,
        }
    }

    pub async fn send(&self, event: ChannelEvent) {
        self.events
            .send(event)
            .await
            .expect("session dropped its event receiver");
    }

    pub async fn send_env(&self, name: &str, value: &str) {
        self.send(ChannelEvent::Environment {
            name: name.to_string(),
            value: value.to_string(),
        })
        .await;
    }

    pub async fn send_exec(&self, command: &str, want_reply: bool) {
        self.send(ChannelEvent::Exec {
            command: command.to_string(),
            want_reply,
        })
        .await;
    }

    pub async fn send_data(&self, bytes: &[u8]) {
        self.send(ChannelEvent::Data(bytes.to_vec())).await;
    }

    /// Receive one output event, bounded by the test timeout.
    pub async fn recv(&mut self) -> Option<ChannelOutput> {
        with_timeout(self.output_rx.recv()).await
    }

    /// Collect outputs until `Close` (inclusive) or until the session drops
    /// its output sender.
    pub async fn collect_until_close(&mut self) -> Vec<ChannelOutput> {
        let mut outputs = Vec::new();
        while let Some(output) = self.recv().await {
            let is_close = matches!(output, ChannelOutput::Close);
            outputs.push(output);
            if is_close {
                break;
            }
        }
        outputs
    }

    /// Drop the event sender and wait for the session task to finish.
    pub async fn finish(self) {
        drop(self.events);
        with_timeout(self.session)
            .await
            .expect("session task panicked");
    }
}

/// Concatenated stdout bytes from a collected output sequence.
pub fn stdout_bytes(outputs: &[ChannelOutput]) -> Vec<u8> {
    outputs
        .iter()
        .filter_map(|o| match o {
            ChannelOutput::Data(bytes) => Some(bytes.as_slice()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .concat()
}

/// Concatenated stderr bytes from a collected output sequence.
pub fn stderr_bytes(outputs: &[ChannelOutput]) -> Vec<u8> {
    outputs
        .iter()
        .filter_map(|o| match o {
            ChannelOutput::StderrData(bytes) => Some(bytes.as_slice()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .concat()
}

/// All exit statuses reported in a collected output sequence.
pub fn exit_statuses(outputs: &[ChannelOutput]) -> Vec<u32> {
    outputs
        .iter()
        .filter_map(|o| match o {
            ChannelOutput::ExitStatus(code) => Some(*code),
            _ => None,
        })
        .collect()
}
