// src/glue/mod.rs

//! Stream glue: forwarding pumps between process streams and channel streams.
//!
//! Each pump is an independent Tokio task so that a slow consumer on one
//! stream can never stall another. Back-pressure comes from the bounded
//! channels and the stream writes themselves; nothing buffers without bound.

pub mod pump;

pub use pump::{StreamGlue, copy_stream, spawn_input_pump, spawn_output_pump};
