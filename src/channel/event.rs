// src/channel/event.rs

/// Inbound per-channel events delivered by the secure transport.
///
/// The transport adapter translates its own request/event objects into this
/// closed set; the session matches it exhaustively, with [`Unknown`] as the
/// explicit unhandled arm rather than a silent fallthrough.
///
/// Expected order on a well-behaved channel: zero or more `Environment`
/// requests, then exactly one `Exec` (or `Shell`), then `Data` chunks, an
/// optional `Eof`, and finally `Inactive`.
///
/// [`Unknown`]: ChannelEvent::Unknown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// One name/value pair for the environment of the future process.
    /// Last write per name wins.
    Environment { name: String, value: String },

    /// Run one command non-interactively under a shell.
    Exec { command: String, want_reply: bool },

    /// Request for an interactive shell. Not supported by this bridge.
    Shell { want_reply: bool },

    /// Inbound channel data destined for the process's stdin.
    Data(Vec<u8>),

    /// The inbound data direction ended (channel half-close). The process
    /// sees EOF on stdin while its output keeps flowing.
    Eof,

    /// Anything the transport could not map onto the variants above,
    /// including data carrying an unexpected stream tag.
    Unknown { description: String },

    /// The channel went inactive (peer closed it or the transport tore down).
    Inactive,
}
