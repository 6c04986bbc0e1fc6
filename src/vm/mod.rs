// src/vm/mod.rs

//! Guest VM lifecycle: booting the virtual machine monitor, serial console
//! access, and shutdown notification. Independent of the exec bridge.

pub mod machine;

pub use machine::{SerialConsole, Vm, VmConfig, VmEvent, VmStopper};
