// src/channel/output.rs

/// Which of the two outbound byte streams a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Outbound channel operations issued by the bridge.
///
/// The transport adapter maps these onto its own channel writes and events:
/// `Data`/`StderrData` become tagged channel data, `Success`/`Failure` become
/// request replies, `ExitStatus` becomes the exit-status event, and `Close`
/// asks the transport to close the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutput {
    /// Primary-output bytes (the process's stdout).
    Data(Vec<u8>),
    /// Error-output bytes (the process's stderr, and the banner).
    StderrData(Vec<u8>),
    /// The exec request was accepted and the process has started.
    Success,
    /// A request failed or was rejected.
    Failure,
    /// The process terminated with this status. Emitted exactly once.
    ExitStatus(u32),
    /// Request channel closure. Nothing meaningful follows.
    Close,
}

impl ChannelOutput {
    /// Wrap a chunk of process output for the given stream.
    pub fn stream_data(stream: OutputStream, bytes: Vec<u8>) -> Self {
        match stream {
            OutputStream::Stdout => ChannelOutput::Data(bytes),
            OutputStream::Stderr => ChannelOutput::StderrData(bytes),
        }
    }
}
