use handoff::store::{DataStoreProvider, FileDataStore};
use std::fs;
use std::path::Path;
use std::process::{Child, Command, ExitStatus};
use std::time::{Duration, Instant};

fn handoff(work_dir: &Path, extra: &[&str]) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_handoff"));
    command
        .arg("--work-dir")
        .arg(work_dir)
        .args([
            "--poll-interval-ms",
            "50",
            "--timeout-ms",
            "20000",
            "--resolution-poll-ms",
            "20",
        ])
        .args(extra);
    command
}

fn wait(mut child: Child) -> ExitStatus {
    child.wait().unwrap()
}

fn rows(work_dir: &Path) -> usize {
    FileDataStore::new(work_dir.join("data"))
        .rows("HANDOFF_TEST")
        .unwrap()
        .len()
}

#[test]
fn test_second_instance_joins_and_both_commit() {
    let dir = tempfile::tempdir().unwrap();
    let token_file = dir.path().join("token.txt");

    let outer = handoff(dir.path(), &["--max-wait-ms", "15000"])
        .spawn()
        .unwrap();
    awaitility::at_most(Duration::from_secs(10)).until(|| token_file.exists());

    let inner = handoff(dir.path(), &[]).spawn().unwrap();
    assert_eq!(wait(inner).code(), Some(0));
    assert_eq!(wait(outer).code(), Some(0));

    assert_eq!(rows(dir.path()), 2);
    assert!(!token_file.exists());
}

#[test]
fn test_spawn_inner_runs_both_participants() {
    let dir = tempfile::tempdir().unwrap();
    let status = handoff(dir.path(), &["--max-wait-ms", "15000", "--spawn-inner", "--rounds", "2"])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(0));
    assert_eq!(rows(dir.path()), 4);
    assert!(!dir.path().join("token.txt").exists());
}

#[test]
fn test_lonely_outer_gives_up_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let started = Instant::now();
    let status = handoff(dir.path(), &["--max-wait-ms", "300"])
        .status()
        .unwrap();

    // no participant enlisted, so the root commits on its own
    assert_eq!(status.code(), Some(0));
    assert!(started.elapsed() < Duration::from_secs(15));
    assert!(!dir.path().join("token.txt").exists());
    assert_eq!(rows(dir.path()), 1);
}

#[test]
fn test_garbage_token_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let token_file = dir.path().join("token.txt");
    fs::write(&token_file, "this is not a propagation token!").unwrap();

    let status = handoff(dir.path(), &[]).status().unwrap();
    assert_eq!(status.code(), Some(1));
    assert!(token_file.exists());
    assert!(!dir.path().join("coordinator").exists());
    assert_eq!(rows(dir.path()), 0);
}

#[test]
fn test_invalid_configuration_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let status = handoff(dir.path(), &["--isolation", "whatever"])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
}
