// src/bridge/mod.rs

//! The exec bridge: one session per channel.
//!
//! A session receives the channel's inbound events, runs at most one process
//! for it, wires the process's three standard streams to the channel, and
//! reports the exit status before asking for channel closure.

pub mod session;

pub use session::{ExecSession, SessionOptions, spawn_session};
