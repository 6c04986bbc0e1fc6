// tests/vm_lifecycle.rs

//! VM lifecycle tests against a stub monitor script standing in for the
//! real virtual machine monitor binary.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use execbridge::vm::{Vm, VmConfig, VmEvent};
use execbridge_test_utils::{init_tracing, with_timeout};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

/// Write an executable stub monitor and dummy boot artifacts, returning a
/// config that boots the stub.
fn stub_vm_config(dir: &TempDir, script_body: &str) -> VmConfig {
    let launcher = dir.path().join("stub-monitor");
    fs::write(&launcher, format!("#!/bin/sh\n{script_body}\n")).unwrap();
    let mut perms = fs::metadata(&launcher).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&launcher, perms).unwrap();

    let artifact = |name: &str| -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, b"stub").unwrap();
        path
    };

    VmConfig::new(
        launcher,
        artifact("vmlinuz"),
        artifact("initrd"),
        artifact("disk.img"),
    )
}

#[tokio::test]
async fn clean_monitor_exit_reports_guest_stopped() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut vm = Vm::start(stub_vm_config(&dir, "exit 0")).expect("boot failed");

    assert_eq!(with_timeout(vm.next_event()).await, Some(VmEvent::GuestStopped));
}

#[tokio::test]
async fn failing_monitor_reports_guest_error() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut vm = Vm::start(stub_vm_config(&dir, "exit 3")).expect("boot failed");

    assert_eq!(
        with_timeout(vm.next_event()).await,
        Some(VmEvent::GuestStoppedWithError(3))
    );
}

#[tokio::test]
async fn requested_stop_is_never_an_error() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    // `read x` keeps the monitor alive on its open serial input.
    let mut vm = Vm::start(stub_vm_config(&dir, "read x")).expect("boot failed");

    vm.stop();
    assert_eq!(with_timeout(vm.next_event()).await, Some(VmEvent::GuestStopped));
}

#[tokio::test]
async fn stopper_works_detached_from_the_vm() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut vm = Vm::start(stub_vm_config(&dir, "read x")).expect("boot failed");

    let stopper = vm.stopper();
    tokio::spawn(async move { stopper.stop() });
    assert_eq!(with_timeout(vm.next_event()).await, Some(VmEvent::GuestStopped));
}

#[tokio::test]
async fn serial_console_carries_monitor_stdout() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut vm = Vm::start(stub_vm_config(&dir, "echo booted")).expect("boot failed");

    let mut serial = vm.take_serial().expect("serial console missing");
    let mut out = Vec::new();
    with_timeout(serial.output.read_to_end(&mut out))
        .await
        .expect("reading serial output failed");
    assert_eq!(out, b"booted\n");

    assert_eq!(with_timeout(vm.next_event()).await, Some(VmEvent::GuestStopped));
}

#[tokio::test]
async fn serial_console_yields_only_once() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut vm = Vm::start(stub_vm_config(&dir, "exit 0")).expect("boot failed");

    assert!(vm.take_serial().is_some());
    assert!(vm.take_serial().is_none());

    let _ = with_timeout(vm.next_event()).await;
}
