// src/channel/mod.rs

//! Transport boundary types.
//!
//! The secure transport (session setup, authentication, channel multiplexing)
//! lives outside this crate. What it owes us per channel is:
//!
//! - inbound: a stream of [`ChannelEvent`]s over a bounded mpsc channel,
//! - outbound: a consumer for [`ChannelOutput`]s.
//!
//! Everything the bridge does is expressed against these two types, which
//! keeps the core testable without any transport in the loop.

pub mod event;
pub mod output;

pub use event::ChannelEvent;
pub use output::{ChannelOutput, OutputStream};
