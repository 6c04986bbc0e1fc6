// src/process/mod.rs

//! Process supervision: spawning `<shell> -c` commands, termination, and
//! exit notification.

pub mod supervisor;

pub use supervisor::{
    ProcessHandle, SpawnSpec, SpawnedProcess, exit_code_of, spawn, supervise,
};
