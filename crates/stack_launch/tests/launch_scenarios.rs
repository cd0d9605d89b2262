//! End-to-end launcher scenarios using `/bin/sh` stand-ins for the services

#![cfg(unix)]

use stack_launch::{
    ExitPolicy, LaunchError, Launcher, LauncherConfig, LauncherError, Readiness, RunOutcome,
    ServiceSpec, WaitMode,
};
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::watch;

/// Script that records SIGTERM in its working directory, then exits
const TRAP_TERM: &str = "trap 'touch terminated; exit 0' TERM; while true; do sleep 0.1; done";

fn sh(name: &str, script: &str) -> ServiceSpec {
    ServiceSpec::new(name, "sh", name).with_args(["-c", script])
}

fn stack_root(dirs: &[&str]) -> TempDir {
    let root = TempDir::new().unwrap();
    for dir in dirs {
        std::fs::create_dir(root.path().join(dir)).unwrap();
    }
    root
}

fn stack_config(root: &TempDir, backend: &str, frontend: &str, delay: Duration) -> LauncherConfig {
    LauncherConfig {
        root: root.path().to_path_buf(),
        services: vec![sh("backend", backend), sh("frontend", frontend)],
        readiness: Readiness::Delay(delay),
        ..Default::default()
    }
}

fn launcher(root: &TempDir, backend: &str, frontend: &str, delay: Duration) -> Launcher {
    Launcher::new(stack_config(root, backend, frontend, delay))
        .with_poll_interval(Duration::from_millis(20))
}

async fn wait_for_file(path: &Path) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_backend_starts_before_frontend_after_delay() {
    let root = stack_root(&["backend", "frontend"]);
    let (_tx, rx) = watch::channel(());
    let delay = Duration::from_millis(300);
    let mut launcher = launcher(&root, "exit 0", "exit 0", delay);

    launcher.launch_all(rx.clone()).await.unwrap();

    let handles = launcher.handles();
    assert_eq!(handles.len(), 2);
    assert_eq!(handles[0].name(), "backend");
    assert_eq!(handles[1].name(), "frontend");
    assert!(handles[1].started_at() >= handles[0].started_at() + delay);

    assert!(matches!(launcher.run(rx).await.unwrap(), RunOutcome::Completed(_)));
}

#[tokio::test]
async fn test_missing_backend_never_starts_frontend() {
    let root = stack_root(&["frontend"]);
    let (_tx, rx) = watch::channel(());
    let mut launcher = launcher(&root, "exit 0", "touch started", Duration::from_millis(10));

    let err = launcher.launch_all(rx).await.unwrap_err();
    assert!(matches!(
        err,
        LauncherError::Launch(LaunchError::MissingWorkingDir { ref name, .. }) if name == "backend"
    ));
    assert!(launcher.handles().is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!root.path().join("frontend/started").exists());
}

#[tokio::test]
async fn test_missing_frontend_stops_backend() {
    let root = stack_root(&["backend"]);
    let (_tx, rx) = watch::channel(());
    // Long enough for the backend shell to install its trap
    let mut launcher = launcher(&root, TRAP_TERM, "exit 0", Duration::from_millis(300));

    let err = launcher.launch_all(rx).await.unwrap_err();
    assert!(matches!(
        err,
        LauncherError::Launch(LaunchError::MissingWorkingDir { ref name, .. }) if name == "frontend"
    ));

    // The backend was started, then asked to terminate
    assert_eq!(launcher.handles().len(), 1);
    assert!(launcher.handles()[0].terminate_requested());
    assert!(wait_for_file(&root.path().join("backend/terminated")).await);
}

#[tokio::test]
async fn test_dropping_launcher_terminates_running_services() {
    let root = stack_root(&["backend", "frontend"]);
    let (_tx, rx) = watch::channel(());
    let mut launcher = launcher(&root, TRAP_TERM, TRAP_TERM, Duration::from_millis(300));

    launcher.launch_all(rx).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    drop(launcher);

    assert!(wait_for_file(&root.path().join("backend/terminated")).await);
    assert!(wait_for_file(&root.path().join("frontend/terminated")).await);
}

#[tokio::test]
async fn test_interrupt_terminates_both() {
    let root = stack_root(&["backend", "frontend"]);
    let (tx, rx) = watch::channel(());
    let mut launcher = launcher(&root, "exec sleep 30", "exec sleep 30", Duration::from_millis(10));

    launcher.launch_all(rx.clone()).await.unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let _ = tx.send(());
    });

    assert_eq!(launcher.run(rx).await.unwrap(), RunOutcome::Interrupted);
    assert!(launcher.handles().iter().all(|h| h.terminate_requested()));

    // Both children die from SIGTERM
    let records = tokio::time::timeout(Duration::from_secs(5), launcher.wait_all())
        .await
        .expect("children survived SIGTERM")
        .unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.code.is_none()));
}

#[tokio::test]
async fn test_interrupt_during_delay_skips_frontend() {
    let root = stack_root(&["backend", "frontend"]);
    let (tx, rx) = watch::channel(());
    let mut launcher = launcher(&root, "exec sleep 30", "exit 0", Duration::from_secs(30));

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = tx.send(());
    });

    tokio::time::timeout(Duration::from_secs(5), launcher.launch_all(rx.clone()))
        .await
        .expect("launch was not interrupted")
        .unwrap();
    assert_eq!(launcher.handles().len(), 1);

    assert_eq!(launcher.run(rx).await.unwrap(), RunOutcome::Interrupted);
    assert!(launcher.handles()[0].terminate_requested());
}

#[tokio::test]
async fn test_sequential_wait_blocks_on_first_child() {
    let root = stack_root(&["backend", "frontend"]);
    let (_tx, rx) = watch::channel(());
    let config = LauncherConfig {
        wait_mode: WaitMode::Sequential,
        ..stack_config(&root, "exit 0", TRAP_TERM, Duration::from_millis(10))
    };
    let mut launcher = Launcher::new(config);

    launcher.launch_all(rx).await.unwrap();

    // The backend is gone at once but the frontend never exits on its own
    let waited = tokio::time::timeout(Duration::from_millis(500), launcher.wait_all()).await;
    assert!(waited.is_err());

    // Dropping the launcher still cleans up the frontend
    tokio::time::sleep(Duration::from_millis(200)).await;
    drop(launcher);
    assert!(wait_for_file(&root.path().join("frontend/terminated")).await);
}

#[tokio::test]
async fn test_stop_on_exit_terminates_remaining() {
    let root = stack_root(&["backend", "frontend"]);
    let (_tx, rx) = watch::channel(());
    let config = LauncherConfig {
        wait_mode: WaitMode::Concurrent,
        exit_policy: ExitPolicy::StopAll,
        ..stack_config(&root, "sleep 0.3; exit 0", "exec sleep 30", Duration::from_millis(10))
    };
    let mut launcher = Launcher::new(config).with_poll_interval(Duration::from_millis(20));

    launcher.launch_all(rx.clone()).await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), launcher.run(rx))
        .await
        .expect("stack did not stop after the backend exited")
        .unwrap();

    match outcome {
        RunOutcome::Completed(records) => {
            assert_eq!(records[0].name, "backend");
            assert_eq!(records[0].code, Some(0));
            assert_eq!(records[1].name, "frontend");
            assert_eq!(records[1].code, None);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_early_exit_keeps_waiting_for_the_rest() {
    let root = stack_root(&["backend", "frontend"]);
    let (_tx, rx) = watch::channel(());
    let mut launcher = launcher(&root, "exit 0", "sleep 0.5; exit 0", Duration::from_millis(10));

    launcher.launch_all(rx.clone()).await.unwrap();
    let started = Instant::now();

    let outcome = launcher.run(rx).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(400));
    assert!(!launcher.handles()[1].terminate_requested());
    assert!(matches!(outcome, RunOutcome::Completed(ref records) if records.len() == 2));
}

#[tokio::test]
async fn test_non_zero_exit_codes_are_reported() {
    let root = stack_root(&["backend", "frontend"]);
    let (_tx, rx) = watch::channel(());
    let mut launcher = launcher(&root, "exit 0", "exit 1", Duration::from_millis(10));

    launcher.launch_all(rx.clone()).await.unwrap();

    match launcher.run(rx).await.unwrap() {
        RunOutcome::Completed(records) => {
            let codes: Vec<_> = records.iter().map(|r| r.code).collect();
            assert_eq!(codes, vec![Some(0), Some(1)]);
            assert!(records[0].success);
            assert!(!records[1].success);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}
