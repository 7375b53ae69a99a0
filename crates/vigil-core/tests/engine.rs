//! End-to-end engine tests against real child processes.
//!
//! These exercise the full supervisor path: spawning into a fresh process
//! group, signal delivery, restart-on-exit, recovery at engine open, and
//! the cleanup that runs when a supervisor winds down.

#![cfg(unix)]

use std::time::Duration;

use nix::sys::signal::kill;
use nix::unistd::Pid;
use tempfile::TempDir;
use vigil_core::{DaemonStatus, DaemonStore, Engine, EngineError};

fn open_store(dir: &TempDir) -> DaemonStore {
    DaemonStore::open(dir.path().join("vigil.db")).expect("open store")
}

/// Polls until the record for `key` reaches `status`, within ~5s.
async fn wait_for_status(engine: &Engine, key: &str, status: DaemonStatus) {
    for _ in 0..100 {
        if engine.get(key).map(|d| d.status).ok() == Some(status) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let observed = engine.get(key).map(|d| d.status);
    panic!("daemon {key} never reached {status:?} (last: {observed:?})");
}

async fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Stops a daemon, retrying while the first spawn has not produced a
/// process group yet (a stop issued right after start can race it).
async fn stop_with_retry(engine: &Engine, key: &str) {
    for _ in 0..40 {
        match engine.stop(key).await {
            Ok(()) => return,
            Err(EngineError::BadPid) => tokio::time::sleep(Duration::from_millis(50)).await,
            Err(err) => panic!("stop {key} failed: {err}"),
        }
    }
    panic!("stop {key} kept failing with no process group");
}

/// Pauses a daemon with the same retry as [`stop_with_retry`].
async fn pause_with_retry(engine: &Engine, key: &str) {
    for _ in 0..40 {
        match engine.pause(key).await {
            Ok(()) => return,
            Err(EngineError::BadPid) => tokio::time::sleep(Duration::from_millis(50)).await,
            Err(err) => panic!("pause {key} failed: {err}"),
        }
    }
    panic!("pause {key} kept failing with no process group");
}

#[tokio::test]
async fn test_full_lifecycle_pause_continue_stop_remove() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(open_store(&dir)).await.unwrap();

    let record = engine.add(None, "sleep 3600", "").unwrap();
    assert_eq!(record.status, DaemonStatus::Stopped);
    assert!(record.disabled);
    let key = record.key;

    engine.start(&key).await.unwrap();
    wait_for_status(&engine, &key, DaemonStatus::Running).await;
    assert!(!engine.get(&key).unwrap().disabled);
    assert!(engine.is_active(&key).await);

    pause_with_retry(&engine, &key).await;
    assert_eq!(engine.get(&key).unwrap().status, DaemonStatus::Paused);

    engine.resume(&key).await.unwrap();
    assert_eq!(engine.get(&key).unwrap().status, DaemonStatus::Running);

    engine.stop(&key).await.unwrap();
    wait_for_status(&engine, &key, DaemonStatus::Stopped).await;
    let stopped = engine.get(&key).unwrap();
    assert!(stopped.disabled);
    assert!(!engine.is_active(&key).await);

    engine.remove(&key).await.unwrap();
    assert!(matches!(engine.get(&key), Err(EngineError::NotFound)));
}

#[tokio::test]
async fn test_start_while_active_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(open_store(&dir)).await.unwrap();

    let key = engine.add(None, "sleep 3600", "").unwrap().key;
    engine.start(&key).await.unwrap();
    assert!(matches!(
        engine.start(&key).await,
        Err(EngineError::AlreadyStarted)
    ));

    stop_with_retry(&engine, &key).await;
    wait_for_status(&engine, &key, DaemonStatus::Stopped).await;
}

#[tokio::test]
async fn test_remove_refused_while_active() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(open_store(&dir)).await.unwrap();

    let key = engine.add(None, "sleep 3600", "").unwrap().key;
    engine.start(&key).await.unwrap();

    assert!(matches!(
        engine.remove(&key).await,
        Err(EngineError::AlreadyStarted)
    ));
    assert_eq!(engine.list().unwrap().len(), 1);

    stop_with_retry(&engine, &key).await;
    wait_for_status(&engine, &key, DaemonStatus::Stopped).await;
    engine.remove(&key).await.unwrap();
    assert!(engine.list().unwrap().is_empty());
}

#[tokio::test]
async fn test_open_resumes_only_enabled_daemons() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    // Simulate state left behind by a killed supervisor: two enabled
    // daemons, one disabled.
    for (key, disabled) in [("aa", false), ("bb", false), ("cc", true)] {
        let mut record = vigil_core::DaemonRecord::new(
            key.to_string(),
            "sleep 3600".to_string(),
            String::new(),
        );
        record.disabled = disabled;
        store.insert(&record).unwrap();
    }

    let engine = Engine::open(store).await.unwrap();
    let mut active = engine.active_keys().await;
    active.sort();
    assert_eq!(active, vec!["aa", "bb"]);
    wait_for_status(&engine, "aa", DaemonStatus::Running).await;
    wait_for_status(&engine, "bb", DaemonStatus::Running).await;
    assert_eq!(engine.get("cc").unwrap().status, DaemonStatus::Stopped);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_keeps_daemons_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(open_store(&dir)).await.unwrap();

    let key = engine.add(None, "sleep 3600", "").unwrap().key;
    engine.start(&key).await.unwrap();
    wait_for_status(&engine, &key, DaemonStatus::Running).await;

    engine.shutdown().await;
    let record = engine.get(&key).unwrap();
    assert_eq!(record.status, DaemonStatus::Stopped);
    assert!(!record.disabled, "shutdown must not disable daemons");
    assert!(!engine.is_active(&key).await);
}

#[tokio::test]
async fn test_restart_loop_respawns_exiting_child() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(open_store(&dir)).await.unwrap();

    let marker = dir.path().join("spawns");
    let cmd = format!("sh -c 'echo x >> {}'", marker.display());
    let key = engine.add(None, &cmd, "").unwrap().key;
    engine.start(&key).await.unwrap();

    wait_until(
        || {
            std::fs::read_to_string(&marker)
                .map(|s| s.lines().count() >= 3)
                .unwrap_or(false)
        },
        "at least three respawns",
    )
    .await;

    // The group id is usually stale by the time we stop a command this
    // short-lived; the exit flag still winds the loop down.
    let _ = engine.stop(&key).await;
    wait_for_status(&engine, &key, DaemonStatus::Stopped).await;
}

#[tokio::test]
async fn test_unspawnable_command_marks_failed() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(open_store(&dir)).await.unwrap();

    let key = engine.add(None, "/does/not/exist/vigil-test", "").unwrap().key;
    engine.start(&key).await.unwrap();
    wait_for_status(&engine, &key, DaemonStatus::Failed).await;
    assert!(engine.is_active(&key).await);

    // No process group exists while the loop is in backoff.
    assert!(matches!(
        engine.stop(&key).await,
        Err(EngineError::BadPid)
    ));
}

#[tokio::test]
async fn test_stop_kills_whole_process_group() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(open_store(&dir)).await.unwrap();

    // The shell backgrounds a grandchild and publishes its pid, then
    // waits so the group stays alive.
    let pid_file = dir.path().join("grandchild.pid");
    let cmd = format!(
        "sh -c 'sleep 3600 & echo $! > {}; wait'",
        pid_file.display()
    );
    let key = engine.add(None, &cmd, "").unwrap().key;
    engine.start(&key).await.unwrap();

    wait_until(|| pid_file.exists(), "grandchild pid file").await;
    let grandchild: i32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();

    stop_with_retry(&engine, &key).await;
    wait_for_status(&engine, &key, DaemonStatus::Stopped).await;

    // The group kill must have reached the backgrounded grandchild too.
    wait_until(
        || kill(Pid::from_raw(grandchild), None).is_err(),
        "grandchild to die with the group",
    )
    .await;
}

#[tokio::test]
async fn test_daemon_runs_in_normalized_dir() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(open_store(&dir)).await.unwrap();

    let out = dir.path().join("cwd.txt");
    let cmd = format!("sh -c 'pwd > {}; sleep 3600'", out.display());
    let key = engine
        .add(None, &cmd, dir.path().to_str().unwrap())
        .unwrap()
        .key;
    engine.start(&key).await.unwrap();

    wait_until(|| out.exists(), "cwd marker file").await;
    let cwd = std::fs::read_to_string(&out).unwrap();
    let canonical = dir.path().canonicalize().unwrap();
    assert_eq!(cwd.trim(), canonical.to_str().unwrap());

    stop_with_retry(&engine, &key).await;
    wait_for_status(&engine, &key, DaemonStatus::Stopped).await;
}
