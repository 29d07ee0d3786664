//! End-to-end tests of the `dintact` binary.
//!
//! stdout is not a terminal under the test harness, so every command answers
//! with JSON.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Env {
    dir: TempDir,
}

impl Env {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("hot")).unwrap();
        fs::create_dir(dir.path().join("cold")).unwrap();
        fs::write(dir.path().join("config.json"), "{}").unwrap();
        Self { dir }
    }

    fn hot(&self) -> std::path::PathBuf {
        self.dir.path().join("hot")
    }

    fn cold(&self) -> std::path::PathBuf {
        self.dir.path().join("cold")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("dintact").unwrap();
        cmd.env("DINTACT_CONFIG", self.dir.path().join("config.json"))
            .env_remove("DINTACT_JOBS")
            .env_remove("DINTACT_DEEP")
            .env_remove("RUST_LOG");
        cmd
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn init_then_check_is_clean() {
    let env = Env::new();
    write(&env.cold(), "a.txt", "alpha");
    write(&env.cold(), "sub/b.txt", "beta");

    env.cmd()
        .arg("init")
        .arg(env.cold())
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""files":2"#));
    assert!(env.cold().join("index.txt").is_file());

    env.cmd()
        .arg("check")
        .arg(env.cold())
        .assert()
        .code(0)
        .stdout(predicate::str::contains(r#""outcome":"clean""#));
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let env = Env::new();
    write(&env.cold(), "a.txt", "alpha");
    env.cmd().arg("init").arg(env.cold()).assert().success();

    env.cmd()
        .arg("init")
        .arg(env.cold())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("ALREADY_INITIALIZED"));

    env.cmd()
        .args(["init", "--force", "--algorithm", "sha256"])
        .arg(env.cold())
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""algorithm":"sha256""#));
}

#[test]
fn check_reports_modified_file() {
    let env = Env::new();
    write(&env.cold(), "docs/f.txt", "original content");
    env.cmd().arg("init").arg(env.cold()).assert().success();

    write(&env.cold(), "docs/f.txt", "tampered");
    env.cmd()
        .arg("check")
        .arg(env.cold())
        .assert()
        .code(12)
        .stdout(predicate::str::contains(r#""outcome":"violation""#))
        .stdout(predicate::str::contains(r#""kind":"modified""#));

    // Accepting makes the tampered content the new baseline.
    env.cmd()
        .args(["check", "--accept"])
        .arg(env.cold())
        .assert()
        .code(10);
    env.cmd().arg("check").arg(env.cold()).assert().code(0);
}

#[test]
fn check_flags_unknown_files_as_anomalies() {
    let env = Env::new();
    write(&env.cold(), "a.txt", "alpha");
    env.cmd().arg("init").arg(env.cold()).assert().success();

    write(&env.cold(), "stray.bin", "??");
    env.cmd()
        .arg("check")
        .arg(env.cold())
        .assert()
        .code(11)
        .stdout(predicate::str::contains("stray.bin"));
}

#[test]
fn check_without_index_fails() {
    let env = Env::new();
    env.cmd()
        .arg("check")
        .arg(env.cold())
        .assert()
        .code(3)
        .stderr(predicate::str::contains("INDEX_NOT_FOUND"));
}

#[test]
fn missing_tree_fails() {
    let env = Env::new();
    env.cmd()
        .arg("check")
        .arg(env.dir.path().join("nowhere"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("TREE_NOT_FOUND"));
}

#[test]
fn sync_mirrors_then_settles() {
    let env = Env::new();
    write(&env.hot(), "a.txt", "alpha");
    write(&env.hot(), "photos/p.jpg", "jpeg");

    env.cmd()
        .arg("sync")
        .arg(env.hot())
        .arg(env.cold())
        .assert()
        .code(10)
        .stdout(predicate::str::contains(r#""kind":"insert""#));
    assert_eq!(fs::read_to_string(env.cold().join("a.txt")).unwrap(), "alpha");
    assert_eq!(fs::read_to_string(env.cold().join("photos/p.jpg")).unwrap(), "jpeg");

    env.cmd()
        .arg("sync")
        .arg(env.hot())
        .arg(env.cold())
        .assert()
        .code(0);
    env.cmd().arg("check").arg(env.cold()).assert().code(0);
    env.cmd()
        .arg("compare")
        .arg(env.hot())
        .arg(env.cold())
        .assert()
        .code(0);
}

#[test]
fn sync_applies_moves_and_deletes() {
    let env = Env::new();
    write(&env.hot(), "a.txt", "alpha");
    write(&env.hot(), "b.txt", "beta");
    env.cmd().arg("sync").arg(env.hot()).arg(env.cold()).assert().code(10);

    fs::create_dir(env.hot().join("moved")).unwrap();
    fs::rename(env.hot().join("a.txt"), env.hot().join("moved/a.txt")).unwrap();
    fs::remove_file(env.hot().join("b.txt")).unwrap();

    env.cmd()
        .arg("sync")
        .arg(env.hot())
        .arg(env.cold())
        .assert()
        .code(10)
        .stdout(predicate::str::contains(r#""kind":"move""#))
        .stdout(predicate::str::contains(r#""kind":"delete""#));
    assert!(!env.cold().join("a.txt").exists());
    assert!(!env.cold().join("b.txt").exists());
    assert_eq!(
        fs::read_to_string(env.cold().join("moved/a.txt")).unwrap(),
        "alpha"
    );
}

#[test]
fn sync_refuses_to_overwrite_corrupted_cold_file() {
    let env = Env::new();
    write(&env.hot(), "f.txt", "version one");
    env.cmd().arg("sync").arg(env.hot()).arg(env.cold()).assert().code(10);

    write(&env.cold(), "f.txt", "bit rot!");
    write(&env.hot(), "f.txt", "version two, longer");

    env.cmd()
        .arg("sync")
        .arg(env.hot())
        .arg(env.cold())
        .assert()
        .code(12)
        .stdout(predicate::str::contains(r#""reason":"diverged""#));
    assert_eq!(fs::read_to_string(env.cold().join("f.txt")).unwrap(), "bit rot!");
}

#[test]
fn dry_run_touches_nothing() {
    let env = Env::new();
    write(&env.hot(), "a.txt", "alpha");

    env.cmd()
        .args(["sync", "--dry-run"])
        .arg(env.hot())
        .arg(env.cold())
        .assert()
        .code(10)
        .stdout(predicate::str::contains(r#""dry_run":true"#));
    assert!(!env.cold().join("a.txt").exists());
    assert!(!env.cold().join("index.txt").exists());
    assert!(!env.hot().join("index.txt").exists());
}

#[test]
fn excluded_files_are_not_indexed() {
    let env = Env::new();
    write(&env.cold(), "keep.txt", "keep");
    write(&env.cold(), "scratch.tmp", "junk");
    write(&env.cold(), ".dintactignore", "cache/\n");
    write(&env.cold(), "cache/blob", "cached");

    env.cmd()
        .args(["init", "--exclude", "*.tmp"])
        .arg(env.cold())
        .assert()
        .success();
    let index = fs::read_to_string(env.cold().join("index.txt")).unwrap();
    assert!(index.contains("keep.txt"));
    assert!(!index.contains("scratch.tmp"));
    assert!(!index.contains("cache/blob"));
}

#[test]
fn compare_lists_pending_changes() {
    let env = Env::new();
    write(&env.hot(), "a.txt", "alpha");
    env.cmd().arg("sync").arg(env.hot()).arg(env.cold()).assert().code(10);

    write(&env.hot(), "b.txt", "beta");
    env.cmd().arg("init").arg("--force").arg(env.hot()).assert().success();

    env.cmd()
        .arg("compare")
        .arg(env.hot())
        .arg(env.cold())
        .assert()
        .code(10)
        .stdout(predicate::str::contains("b.txt"));
}

#[test]
fn bad_settings_file_is_a_config_error() {
    let env = Env::new();
    fs::write(env.dir.path().join("config.json"), "{ not json").unwrap();
    env.cmd()
        .arg("check")
        .arg(env.cold())
        .assert()
        .code(7)
        .stderr(predicate::str::contains("CONFIG_ERROR"));
}

#[test]
fn version_prints_json() {
    let env = Env::new();
    env.cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""version""#));
}

#[test]
fn sync_follows_a_move_onto_a_vacated_directory() {
    let env = Env::new();
    write(&env.hot(), "a", "first");
    write(&env.hot(), "q/r", "second");
    env.cmd().arg("sync").arg(env.hot()).arg(env.cold()).assert().code(10);

    fs::rename(env.hot().join("q/r"), env.hot().join("z")).unwrap();
    fs::remove_dir(env.hot().join("q")).unwrap();
    fs::rename(env.hot().join("a"), env.hot().join("q")).unwrap();

    env.cmd()
        .arg("sync")
        .arg(env.hot())
        .arg(env.cold())
        .assert()
        .code(10)
        .stdout(predicate::str::contains(r#""failures":[]"#));
    assert_eq!(fs::read_to_string(env.cold().join("q")).unwrap(), "first");
    assert_eq!(fs::read_to_string(env.cold().join("z")).unwrap(), "second");
    env.cmd().arg("check").arg(env.cold()).assert().code(0);
}

#[test]
fn sync_repair_restores_damaged_cold_files() {
    let env = Env::new();
    write(&env.hot(), "f.txt", "precious");
    write(&env.hot(), "g.txt", "also precious");
    env.cmd().arg("sync").arg(env.hot()).arg(env.cold()).assert().code(10);

    write(&env.cold(), "f.txt", "bit rot, longer");
    fs::remove_file(env.cold().join("g.txt")).unwrap();
    env.cmd().arg("check").arg(env.cold()).assert().code(12);

    env.cmd()
        .args(["sync", "--repair"])
        .arg(env.hot())
        .arg(env.cold())
        .assert()
        .code(10)
        .stdout(predicate::str::contains(r#""damage":"diverged""#))
        .stdout(predicate::str::contains(r#""damage":"missing""#));
    assert_eq!(fs::read_to_string(env.cold().join("f.txt")).unwrap(), "precious");
    assert_eq!(fs::read_to_string(env.cold().join("g.txt")).unwrap(), "also precious");
    env.cmd().arg("check").arg(env.cold()).assert().code(0);
}

#[test]
fn sync_confirm_needs_a_terminal() {
    let env = Env::new();
    write(&env.hot(), "a.txt", "alpha");
    env.cmd()
        .args(["sync", "--confirm"])
        .arg(env.hot())
        .arg(env.cold())
        .write_stdin("y\n")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("INVALID_ARGUMENT"));
    assert!(!env.cold().join("a.txt").exists());
}
