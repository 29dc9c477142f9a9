mod common;

use common::command::{grit_commit, repository_dir, run_grit_command};
use common::file::{FileSpec, write_file};
use assert_fs::TempDir;
use predicates::prelude::{predicate, PredicateBooleanExt};
use rstest::{fixture, rstest};

#[fixture]
fn committed_repository(repository_dir: TempDir) -> TempDir {
    run_grit_command(repository_dir.path(), &["init"])
        .assert()
        .success();
    write_file(FileSpec::new(
        repository_dir.path().join("file.txt"),
        "one\ntwo\nthree\n".to_string(),
    ));
    write_file(FileSpec::new(
        repository_dir.path().join("other.txt"),
        "other\n".to_string(),
    ));
    run_grit_command(repository_dir.path(), &["add", "."])
        .assert()
        .success();
    grit_commit(repository_dir.path(), "Base").assert().success();

    repository_dir
}

#[rstest]
fn unstaged_modification_shows_hunks(committed_repository: TempDir) {
    let dir = committed_repository;
    write_file(FileSpec::new(
        dir.path().join("file.txt"),
        "one\nTWO\nthree\n".to_string(),
    ));

    run_grit_command(dir.path(), &["diff"])
        .assert()
        .success()
        .stdout(predicate::str::contains("diff --git a/file.txt b/file.txt"))
        .stdout(predicate::str::contains("--- a/file.txt"))
        .stdout(predicate::str::contains("+++ b/file.txt"))
        .stdout(predicate::str::contains("@@ -1,3 +1,3 @@"))
        .stdout(predicate::str::contains("-two"))
        .stdout(predicate::str::contains("+TWO"));
}

#[rstest]
fn clean_worktree_produces_empty_diff(committed_repository: TempDir) {
    let dir = committed_repository;

    run_grit_command(dir.path(), &["diff"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[rstest]
fn staged_diff_compares_index_against_head(committed_repository: TempDir) {
    let dir = committed_repository;
    write_file(FileSpec::new(
        dir.path().join("file.txt"),
        "one\ntwo\nthree\nfour\n".to_string(),
    ));
    run_grit_command(dir.path(), &["add", "file.txt"])
        .assert()
        .success();

    // staged shows the change, unstaged side is clean again
    run_grit_command(dir.path(), &["diff", "--staged"])
        .assert()
        .success()
        .stdout(predicate::str::contains("+four"));
    run_grit_command(dir.path(), &["diff"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[rstest]
fn cached_is_a_synonym_for_staged(committed_repository: TempDir) {
    let dir = committed_repository;
    write_file(FileSpec::new(
        dir.path().join("file.txt"),
        "changed\n".to_string(),
    ));
    run_grit_command(dir.path(), &["add", "file.txt"])
        .assert()
        .success();

    run_grit_command(dir.path(), &["diff", "--cached"])
        .assert()
        .success()
        .stdout(predicate::str::contains("+changed"));
}

#[rstest]
fn staged_diff_with_empty_index_lists_head_paths_as_deleted(committed_repository: TempDir) {
    let dir = committed_repository;

    // wipe the index: every HEAD path now counts as staged-deleted
    std::fs::remove_file(dir.path().join(".git/index")).unwrap();

    run_grit_command(dir.path(), &["diff", "--staged"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted file mode 100644"))
        .stdout(predicate::str::contains("diff --git a/file.txt b/file.txt"))
        .stdout(predicate::str::contains("diff --git a/other.txt b/other.txt"));
}

#[rstest]
fn deleted_worktree_file_diffs_against_dev_null(committed_repository: TempDir) {
    let dir = committed_repository;
    std::fs::remove_file(dir.path().join("other.txt")).unwrap();

    run_grit_command(dir.path(), &["diff"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted file mode"))
        .stdout(predicate::str::contains("+++ /dev/null"))
        .stdout(predicate::str::contains("-other"));
}

#[rstest]
fn diff_restricted_to_path(committed_repository: TempDir) {
    let dir = committed_repository;
    write_file(FileSpec::new(
        dir.path().join("file.txt"),
        "changed\n".to_string(),
    ));
    write_file(FileSpec::new(
        dir.path().join("other.txt"),
        "also changed\n".to_string(),
    ));

    run_grit_command(dir.path(), &["diff", "other.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("other.txt"))
        .stdout(predicate::str::contains("file.txt").not());
}

#[rstest]
fn binary_file_reports_without_hunks(committed_repository: TempDir) {
    let dir = committed_repository;
    std::fs::write(dir.path().join("blob.bin"), [0u8, 1, 2, 3]).unwrap();
    run_grit_command(dir.path(), &["add", "blob.bin"])
        .assert()
        .success();
    grit_commit(dir.path(), "Add binary").assert().success();

    std::fs::write(dir.path().join("blob.bin"), [9u8, 8, 0, 7]).unwrap();

    run_grit_command(dir.path(), &["diff"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Binary files a/blob.bin and b/blob.bin differ",
        ));
}
