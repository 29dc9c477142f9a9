mod common;

use common::command::{grit_commit, repository_dir, run_grit_command};
use common::file::{FileSpec, write_file};
use assert_fs::TempDir;
use predicates::prelude::predicate;
use rstest::rstest;

#[rstest]
fn add_single_file_to_index_successfully(repository_dir: TempDir) {
    run_grit_command(repository_dir.path(), &["init"])
        .assert()
        .success();
    write_file(FileSpec::new(
        repository_dir.path().join("hello.txt"),
        "hello\n".to_string(),
    ));

    run_grit_command(repository_dir.path(), &["add", "hello.txt"])
        .assert()
        .success();

    // the blob for "hello\n" lands at the well-known digest
    let object_path = repository_dir
        .path()
        .join(".git/objects/ce/013625030ba8dba906f756967f9e9ca394464a");
    assert!(object_path.exists());

    run_grit_command(repository_dir.path(), &["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("new file:   hello.txt"));
}

#[rstest]
fn add_files_from_nested_directories_to_index(repository_dir: TempDir) {
    run_grit_command(repository_dir.path(), &["init"])
        .assert()
        .success();
    write_file(FileSpec::new(
        repository_dir.path().join("a/b/deep.txt"),
        "deep".to_string(),
    ));
    write_file(FileSpec::new(
        repository_dir.path().join("top.txt"),
        "top".to_string(),
    ));

    run_grit_command(repository_dir.path(), &["add", "."])
        .assert()
        .success();

    run_grit_command(repository_dir.path(), &["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("a/b/deep.txt"))
        .stdout(predicate::str::contains("top.txt"));
}

#[rstest]
fn adding_a_non_existent_file_is_ignored(repository_dir: TempDir) {
    run_grit_command(repository_dir.path(), &["init"])
        .assert()
        .success();

    run_grit_command(repository_dir.path(), &["add", "missing.txt"])
        .assert()
        .success();
}

#[rstest]
fn staged_file_clears_from_status_after_commit(repository_dir: TempDir) {
    run_grit_command(repository_dir.path(), &["init"])
        .assert()
        .success();
    write_file(FileSpec::new(
        repository_dir.path().join("file.txt"),
        "content".to_string(),
    ));
    run_grit_command(repository_dir.path(), &["add", "."])
        .assert()
        .success();
    grit_commit(repository_dir.path(), "First").assert().success();

    run_grit_command(repository_dir.path(), &["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing to commit"));
}

#[rstest]
fn modified_file_reports_as_unstaged(repository_dir: TempDir) {
    run_grit_command(repository_dir.path(), &["init"])
        .assert()
        .success();
    write_file(FileSpec::new(
        repository_dir.path().join("file.txt"),
        "before\n".to_string(),
    ));
    run_grit_command(repository_dir.path(), &["add", "."])
        .assert()
        .success();
    grit_commit(repository_dir.path(), "First").assert().success();

    write_file(FileSpec::new(
        repository_dir.path().join("file.txt"),
        "after\n".to_string(),
    ));

    run_grit_command(repository_dir.path(), &["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("modified:   file.txt"));
}

#[rstest]
fn untracked_files_listed_in_status(repository_dir: TempDir) {
    run_grit_command(repository_dir.path(), &["init"])
        .assert()
        .success();
    write_file(FileSpec::new(
        repository_dir.path().join("stray.txt"),
        "stray".to_string(),
    ));

    run_grit_command(repository_dir.path(), &["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Untracked files:"))
        .stdout(predicate::str::contains("stray.txt"));
}
