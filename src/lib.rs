// src/lib.rs

pub mod bridge;
pub mod channel;
pub mod cli;
pub mod config;
pub mod errors;
pub mod glue;
pub mod logging;
pub mod process;
pub mod vm;

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bridge::spawn_session;
use crate::channel::{ChannelEvent, ChannelOutput};
use crate::cli::CliArgs;
use crate::config::loader::{default_config_path, load_and_validate};
use crate::config::model::ConfigFile;
use crate::glue::copy_stream;
use crate::vm::{Vm, VmEvent};

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - config loading
/// - `--check` config inspection
/// - `--exec` local one-shot sessions
/// - guest VM console mode when `[vm].enabled = true`
pub async fn run(args: CliArgs) -> Result<i32> {
    let cfg = load_config(&args)?;

    if args.check {
        print_check(&args.config, &cfg);
        return Ok(0);
    }

    if let Some(command) = args.exec {
        return run_local_exec(&cfg, command).await;
    }

    if cfg.vm.is_some() {
        return run_vm_console(cfg).await;
    }

    Err(anyhow!(
        "nothing to do: pass --exec or --check, or enable [vm] in the config"
    ))
}

/// Load the config named on the CLI.
///
/// The built-in default path is allowed to be missing (the bridge runs fine
/// on defaults); an explicitly chosen path that does not exist is an error.
fn load_config(args: &CliArgs) -> Result<ConfigFile> {
    let path = Path::new(&args.config);
    if !path.exists() && path == default_config_path() {
        debug!(path = %path.display(), "no config file found; using defaults");
        return Ok(ConfigFile::default());
    }

    let cfg = load_and_validate(path)
        .with_context(|| format!("loading config file at {:?}", path))?;
    Ok(cfg)
}

/// `--check` output: print the effective configuration.
fn print_check(path: &str, cfg: &ConfigFile) {
    println!("execbridge config check: {path}");
    println!("  exec.shell = {}", cfg.exec.shell);
    match &cfg.exec.banner {
        Some(banner) => println!("  exec.banner = {banner:?}"),
        None => println!("  exec.banner = (none)"),
    }
    match &cfg.vm {
        Some(vm) => {
            println!("  vm.launcher = {}", vm.launcher.display());
            println!("  vm.kernel_image = {}", vm.kernel_image.display());
            println!("  vm.initial_ramdisk = {}", vm.initial_ramdisk.display());
            println!("  vm.bootable_disk = {}", vm.bootable_disk.display());
            println!("  vm.cpus = {}", vm.cpus);
            println!("  vm.memory_mib = {}", vm.memory_mib);
            println!("  vm.kernel_cmdline = {}", vm.kernel_cmdline);
        }
        None => println!("  vm = disabled"),
    }
    println!("config OK");
}

/// Run one command through a full exec session wired to the local terminal.
///
/// The local environment is forwarded as environment events, so the command
/// sees the same variables a directly spawned child would.
async fn run_local_exec(cfg: &ConfigFile, command: String) -> Result<i32> {
    let (output_tx, mut output_rx) = mpsc::channel::<ChannelOutput>(64);
    let (events_tx, session) = spawn_session(cfg.session_options(), output_tx);

    for (name, value) in std::env::vars() {
        send_event(&events_tx, ChannelEvent::Environment { name, value }).await?;
    }
    send_event(
        &events_tx,
        ChannelEvent::Exec {
            command,
            want_reply: true,
        },
    )
    .await?;

    // Local stdin becomes channel data; local EOF becomes channel EOF.
    let stdin_events = events_tx.clone();
    let stdin_pump = tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = [0u8; 4096];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if stdin_events
                        .send(ChannelEvent::Data(buf[..n].to_vec()))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "reading local stdin failed");
                    break;
                }
            }
        }
        let _ = stdin_events.send(ChannelEvent::Eof).await;
    });

    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();
    let mut exit_code: i32 = 1;
    while let Some(output) = output_rx.recv().await {
        match output {
            ChannelOutput::Data(bytes) => {
                stdout.write_all(&bytes).await?;
                stdout.flush().await?;
            }
            ChannelOutput::StderrData(bytes) => {
                stderr.write_all(&bytes).await?;
                stderr.flush().await?;
            }
            ChannelOutput::Success => debug!("exec request accepted"),
            ChannelOutput::Failure => {
                warn!("exec request failed");
                exit_code = 1;
            }
            ChannelOutput::ExitStatus(code) => exit_code = code.min(255) as i32,
            ChannelOutput::Close => break,
        }
    }

    stdin_pump.abort();
    drop(events_tx);
    let _ = session.await;
    Ok(exit_code)
}

/// Boot the guest and attach its serial console to the local terminal.
/// Ctrl-C requests guest shutdown.
async fn run_vm_console(cfg: ConfigFile) -> Result<i32> {
    let vm_config = cfg
        .vm
        .ok_or_else(|| anyhow!("[vm] section is not enabled"))?;
    let mut vm = Vm::start(vm_config).context("booting guest")?;
    let serial = vm
        .take_serial()
        .ok_or_else(|| anyhow!("guest serial console already taken"))?;

    // Ctrl-C → orderly guest stop.
    let stopper = vm.stopper();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("failed to listen for Ctrl+C: {e}");
            return;
        }
        stopper.stop();
    });

    let inbound = tokio::spawn(copy_stream(tokio::io::stdin(), serial.input));
    let outbound = tokio::spawn(copy_stream(serial.output, tokio::io::stdout()));

    let event = vm.next_event().await;
    inbound.abort();
    outbound.abort();

    match event {
        Some(VmEvent::GuestStopped) | None => {
            info!("guest stopped");
            Ok(0)
        }
        Some(VmEvent::GuestStoppedWithError(code)) => {
            warn!(code, "guest stopped with error");
            Ok(code.min(255) as i32)
        }
    }
}

async fn send_event(
    events_tx: &mpsc::Sender<ChannelEvent>,
    event: ChannelEvent,
) -> Result<()> {
    events_tx
        .send(event)
        .await
        .map_err(|_| anyhow!("exec session ended before the request was delivered"))
}
