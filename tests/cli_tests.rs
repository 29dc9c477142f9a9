mod common;

use common::command::{repository_dir, run_grit_command};
use assert_fs::TempDir;
use predicates::prelude::predicate;
use rstest::rstest;

#[rstest]
fn new_repository_initiated_with_git_directory(repository_dir: TempDir) {
    run_grit_command(repository_dir.path(), &["init"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Initialized empty repository in"));

    let git_dir = repository_dir.path().join(".git");
    assert!(git_dir.join("objects").is_dir());
    assert!(git_dir.join("refs/heads").is_dir());
    assert!(git_dir.join("logs").is_dir());

    let head = std::fs::read_to_string(git_dir.join("HEAD")).unwrap();
    assert_eq!(head, "ref: refs/heads/master\n");
}

#[rstest]
fn init_is_idempotent(repository_dir: TempDir) {
    run_grit_command(repository_dir.path(), &["init"])
        .assert()
        .success();
    run_grit_command(repository_dir.path(), &["init"])
        .assert()
        .success();
}

#[rstest]
fn init_with_sha256_object_format_writes_extension(repository_dir: TempDir) {
    run_grit_command(repository_dir.path(), &["init", "--object-format", "sha256"])
        .assert()
        .success();

    let config = std::fs::read_to_string(repository_dir.path().join(".git/config")).unwrap();
    assert!(config.contains("objectformat = sha256"));
}

#[rstest]
fn status_in_fresh_repository_reports_clean(repository_dir: TempDir) {
    run_grit_command(repository_dir.path(), &["init"])
        .assert()
        .success();

    run_grit_command(repository_dir.path(), &["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing to commit, working tree clean"));
}

#[rstest]
fn log_with_path_argument_fails_with_usage(repository_dir: TempDir) {
    run_grit_command(repository_dir.path(), &["init"])
        .assert()
        .success();

    // log accepts a single revision; a second positional is a usage error
    run_grit_command(repository_dir.path(), &["log", "HEAD", "some/path"])
        .assert()
        .failure();
}
