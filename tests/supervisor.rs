// tests/supervisor.rs

//! Process supervisor tests against a real `/bin/sh`.

use std::collections::BTreeMap;

use execbridge::process::{SpawnSpec, spawn};
use execbridge_test_utils::{init_tracing, with_timeout};
use tokio::io::AsyncReadExt;

fn sh_spec(command: &str) -> SpawnSpec {
    SpawnSpec {
        shell: "/bin/sh".into(),
        command: command.to_string(),
        env: BTreeMap::new(),
    }
}

#[tokio::test]
async fn captures_stdout_and_reports_exit_zero() {
    init_tracing();
    let mut spawned = spawn(sh_spec("echo hi")).expect("spawn failed");

    let mut out = Vec::new();
    with_timeout(spawned.stdout.read_to_end(&mut out))
        .await
        .expect("reading stdout failed");
    assert_eq!(out, b"hi\n");

    let code = with_timeout(spawned.exit_rx).await.expect("exit lost");
    assert_eq!(code, 0);
}

#[tokio::test]
async fn reports_nonzero_exit_code() {
    init_tracing();
    let spawned = spawn(sh_spec("exit 3")).expect("spawn failed");

    let code = with_timeout(spawned.exit_rx).await.expect("exit lost");
    assert_eq!(code, 3);
}

#[tokio::test]
async fn terminate_kills_a_blocked_process() {
    init_tracing();
    // `read x` blocks on the still-open stdin pipe.
    let spawned = spawn(sh_spec("read x")).expect("spawn failed");

    spawned.handle.terminate();
    let code = with_timeout(spawned.exit_rx).await.expect("exit lost");
    // SIGKILL, reported shell-style.
    assert_eq!(code, 137);
}

#[tokio::test]
async fn terminate_is_idempotent() {
    init_tracing();
    let spawned = spawn(sh_spec("read x")).expect("spawn failed");

    spawned.handle.terminate();
    spawned.handle.terminate();
    spawned.handle.terminate();

    let code = with_timeout(spawned.exit_rx).await.expect("exit lost");
    assert_eq!(code, 137);

    // Termination after exit is a no-op.
    spawned.handle.terminate();
}

#[tokio::test]
async fn captured_environment_replaces_the_inherited_one() {
    init_tracing();
    let mut env = BTreeMap::new();
    env.insert("ONLY_VAR".to_string(), "42".to_string());
    let spec = SpawnSpec {
        shell: "/bin/sh".into(),
        command: "echo ${ONLY_VAR}:${HOME:-nohome}".to_string(),
        env,
    };
    let mut spawned = spawn(spec).expect("spawn failed");

    let mut out = Vec::new();
    with_timeout(spawned.stdout.read_to_end(&mut out))
        .await
        .expect("reading stdout failed");
    assert_eq!(out, b"42:nohome\n");
}

#[tokio::test]
async fn missing_shell_is_a_spawn_error() {
    init_tracing();
    let spec = SpawnSpec {
        shell: "/nonexistent/shell".into(),
        command: "echo hi".to_string(),
        env: BTreeMap::new(),
    };
    assert!(spawn(spec).is_err());
}
