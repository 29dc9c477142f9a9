use crate::common::file::{FileSpec, write_file};
use assert_cmd::Command;
use assert_fs::TempDir;
use rstest::fixture;
use std::path::Path;

/// Fixed authorship so commit digests are reproducible across runs
pub const AUTHOR_NAME: &str = "Test Author";
pub const AUTHOR_EMAIL: &str = "author@example.com";
pub const AUTHOR_DATE: &str = "2024-03-01 12:00:00 +0000";

#[fixture]
pub fn repository_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

#[fixture]
pub fn init_repository_dir(repository_dir: TempDir) -> TempDir {
    run_grit_command(repository_dir.path(), &["init"])
        .assert()
        .success();

    let file1 = FileSpec::new(repository_dir.path().join("1.txt"), "one".to_string());
    write_file(file1);

    let file2 = FileSpec::new(
        repository_dir.path().join("a").join("2.txt"),
        "two".to_string(),
    );
    write_file(file2);

    run_grit_command(repository_dir.path(), &["add", "."])
        .assert()
        .success();

    grit_commit(repository_dir.path(), "Initial commit")
        .assert()
        .success();

    repository_dir
}

pub fn run_grit_command(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::cargo_bin("grit").expect("Failed to find grit binary");
    cmd.current_dir(dir);
    for arg in args {
        cmd.arg(arg);
    }
    cmd
}

pub fn grit_commit(dir: &Path, message: &str) -> Command {
    let mut cmd = run_grit_command(dir, &["commit", "-m", message]);
    cmd.env("GIT_AUTHOR_NAME", AUTHOR_NAME)
        .env("GIT_AUTHOR_EMAIL", AUTHOR_EMAIL)
        .env("GIT_COMMITTER_NAME", AUTHOR_NAME)
        .env("GIT_COMMITTER_EMAIL", AUTHOR_EMAIL);
    cmd
}

/// Commit with an explicit date, for tests that rely on log ordering
pub fn grit_commit_at(dir: &Path, message: &str, date: &str) -> Command {
    let mut cmd = grit_commit(dir, message);
    cmd.env("GIT_AUTHOR_DATE", date)
        .env("GIT_COMMITTER_DATE", date);
    cmd
}

/// Read the digest HEAD currently resolves to
pub fn head_oid(dir: &Path) -> String {
    let head = std::fs::read_to_string(dir.join(".git/HEAD")).expect("HEAD exists");
    let head = head.trim();

    if let Some(target) = head.strip_prefix("ref: ") {
        std::fs::read_to_string(dir.join(".git").join(target.trim()))
            .expect("branch ref exists")
            .trim()
            .to_string()
    } else {
        head.to_string()
    }
}
