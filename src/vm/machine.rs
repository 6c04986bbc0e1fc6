// src/vm/machine.rs

//! Boots a Linux guest by spawning a virtual machine monitor process with
//! the guest's serial console on the process's stdio, and reports guest
//! shutdown as lifecycle events.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::process::{ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::process::{self, ProcessHandle};

const DEFAULT_CPUS: u32 = 4;
const DEFAULT_MEMORY_MIB: u64 = 2048;
const DEFAULT_KERNEL_CMDLINE: &str = "console=hvc0";

/// How to boot the guest. All paths must exist; validation happens in the
/// config layer before this struct is built.
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// The virtual machine monitor binary, e.g. a qemu system emulator.
    pub launcher: PathBuf,
    pub kernel_image: PathBuf,
    pub initial_ramdisk: PathBuf,
    pub bootable_disk: PathBuf,
    pub cpus: u32,
    pub memory_mib: u64,
    pub kernel_cmdline: String,
}

impl VmConfig {
    pub fn new(
        launcher: PathBuf,
        kernel_image: PathBuf,
        initial_ramdisk: PathBuf,
        bootable_disk: PathBuf,
    ) -> Self {
        Self {
            launcher,
            kernel_image,
            initial_ramdisk,
            bootable_disk,
            cpus: DEFAULT_CPUS,
            memory_mib: DEFAULT_MEMORY_MIB,
            kernel_cmdline: DEFAULT_KERNEL_CMDLINE.to_string(),
        }
    }
}

/// Guest lifecycle notifications, derived from the monitor's exit status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmEvent {
    /// The guest stopped cleanly, or because we asked it to.
    GuestStopped,
    /// The monitor exited with a failure status nobody requested.
    GuestStoppedWithError(u32),
}

/// The guest's serial console, as a readable/writable byte stream pair.
pub struct SerialConsole {
    pub input: ChildStdin,
    pub output: ChildStdout,
}

/// Clonable stop handle, detached from the [`Vm`] so shutdown can be
/// requested from a signal handler task while another task waits on
/// [`Vm::next_event`].
#[derive(Clone)]
pub struct VmStopper {
    handle: ProcessHandle,
    stop_requested: Arc<AtomicBool>,
}

impl VmStopper {
    /// Request guest shutdown. Idempotent and non-blocking.
    pub fn stop(&self) {
        info!("guest stop requested");
        self.stop_requested.store(true, Ordering::SeqCst);
        self.handle.terminate();
    }
}

/// A booted guest.
///
/// Dropping the `Vm` kills the monitor process; `stop` is the orderly way
/// to shut down.
pub struct Vm {
    serial: Option<SerialConsole>,
    handle: ProcessHandle,
    events_rx: mpsc::Receiver<VmEvent>,
    stop_requested: Arc<AtomicBool>,
}

impl Vm {
    /// Boot the guest by launching the monitor process.
    pub fn start(config: VmConfig) -> io::Result<Vm> {
        info!(
            launcher = %config.launcher.display(),
            kernel = %config.kernel_image.display(),
            cpus = config.cpus,
            memory_mib = config.memory_mib,
            "booting guest"
        );

        let mut cmd = Command::new(&config.launcher);
        cmd.arg("-kernel")
            .arg(&config.kernel_image)
            .arg("-initrd")
            .arg(&config.initial_ramdisk)
            .arg("-append")
            .arg(&config.kernel_cmdline)
            .arg("-drive")
            .arg(format!(
                "file={},if=virtio,format=raw",
                config.bootable_disk.display()
            ))
            .arg("-smp")
            .arg(config.cpus.to_string())
            .arg("-m")
            .arg(config.memory_mib.to_string())
            .arg("-nographic")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // Monitor diagnostics go to the host's stderr, separate from
            // the serial console.
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let stdin = child.stdin.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "monitor stdin was not captured")
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "monitor stdout was not captured")
        })?;

        let (handle, exit_rx) = process::supervise(child);

        let stop_requested = Arc::new(AtomicBool::new(false));
        let (events_tx, events_rx) = mpsc::channel(4);
        let stop_flag = Arc::clone(&stop_requested);
        tokio::spawn(async move {
            let event = match exit_rx.await {
                // A requested stop is never an error, whatever status the
                // kill left behind.
                Ok(_) if stop_flag.load(Ordering::SeqCst) => VmEvent::GuestStopped,
                Ok(0) => VmEvent::GuestStopped,
                Ok(code) => {
                    warn!(code, "guest monitor exited with failure status");
                    VmEvent::GuestStoppedWithError(code)
                }
                Err(_) => {
                    warn!("guest monitor exit notification lost");
                    VmEvent::GuestStoppedWithError(255)
                }
            };
            if events_tx.send(event).await.is_err() {
                debug!("vm event receiver dropped");
            }
        });

        Ok(Vm {
            serial: Some(SerialConsole {
                input: stdin,
                output: stdout,
            }),
            handle,
            events_rx,
            stop_requested,
        })
    }

    /// Take the serial console stream pair. Yields once; later calls return
    /// `None`.
    pub fn take_serial(&mut self) -> Option<SerialConsole> {
        self.serial.take()
    }

    /// Request guest shutdown. Idempotent and non-blocking; completion is
    /// reported through [`Vm::next_event`].
    pub fn stop(&self) {
        self.stopper().stop();
    }

    /// A detached stop handle for this guest.
    pub fn stopper(&self) -> VmStopper {
        VmStopper {
            handle: self.handle.clone(),
            stop_requested: Arc::clone(&self.stop_requested),
        }
    }

    /// Wait for the next lifecycle event. Returns `None` once the final
    /// event has been consumed.
    pub async fn next_event(&mut self) -> Option<VmEvent> {
        self.events_rx.recv().await
    }
}
