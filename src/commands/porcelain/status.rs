use crate::areas::repository::Repository;
use crate::artifacts::core::cancel::CancelToken;
use crate::artifacts::diff::tree_diff::{
    ContentLoader, DiffOptions, DiffStatus, HashDiff, compare_entry_sets, index_entry_set,
    tree_entry_set, worktree_entry_set,
};
use crate::artifacts::objects::object_id::ObjectId;
use bytes::Bytes;
use colored::Colorize;
use std::io::Write;
use std::path::{Path, PathBuf};

impl Repository {
    /// The status dashboard
    ///
    /// Shows the current branch, staged changes (HEAD vs index), unstaged
    /// changes (index vs worktree), and untracked files.
    pub async fn status(&mut self) -> anyhow::Result<()> {
        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        let cancel = CancelToken::new();
        let options = DiffOptions {
            detect_renames: false,
            ..Default::default()
        };
        let no_content: ContentLoader = &|_: &Path, _: &ObjectId| Ok(Bytes::new());

        let head_tree = match self.refs().read_head()? {
            Some(head_oid) => self
                .database()
                .parse_object_as_commit(&head_oid)?
                .map(|commit| commit.tree_oid().clone()),
            None => None,
        };

        let head_set = tree_entry_set(self.database(), head_tree.as_ref())?;
        let index_set = index_entry_set(&index);
        let worktree_set = worktree_entry_set(self.workspace(), &index, self.kind())?;

        let staged =
            compare_entry_sets(&head_set, &index_set, &options, no_content, no_content, &cancel)?;
        let unstaged = compare_entry_sets(
            &index_set,
            &worktree_set,
            &options,
            no_content,
            no_content,
            &cancel,
        )?;

        let untracked: Vec<PathBuf> = self
            .workspace()
            .list_files(None)?
            .into_iter()
            .filter(|path| index.entry_by_path(path).is_none())
            .filter(|path| index.conflict_entries(path).is_empty())
            .collect();

        let conflicted: Vec<PathBuf> = {
            let mut paths: Vec<PathBuf> = index
                .entries()
                .filter(|entry| entry.stage != 0)
                .map(|entry| entry.name.clone())
                .collect();
            paths.dedup();
            paths
        };

        let mut writer = self.writer();

        match self.refs().current_branch()? {
            Some(branch) => writeln!(writer, "On branch {}", branch)?,
            None => {
                let head = self.refs().read_head()?;
                match head {
                    Some(oid) => writeln!(writer, "HEAD detached at {}", oid.to_short_oid())?,
                    None => writeln!(writer, "On branch (unborn)")?,
                }
            }
        }

        if !staged.is_empty() {
            writeln!(writer, "\nChanges to be committed:")?;
            for diff in &staged {
                writeln!(writer, "\t{}", Self::describe(diff).green())?;
            }
        }

        if !conflicted.is_empty() {
            writeln!(writer, "\nUnmerged paths:")?;
            for path in &conflicted {
                writeln!(writer, "\t{}", format!("both modified:   {}", path.display()).red())?;
            }
        }

        if !unstaged.is_empty() {
            writeln!(writer, "\nChanges not staged for commit:")?;
            for diff in &unstaged {
                writeln!(writer, "\t{}", Self::describe(diff).red())?;
            }
        }

        if !untracked.is_empty() {
            writeln!(writer, "\nUntracked files:")?;
            for path in &untracked {
                writeln!(writer, "\t{}", path.display().to_string().red())?;
            }
        }

        if staged.is_empty() && unstaged.is_empty() && untracked.is_empty() && conflicted.is_empty()
        {
            writeln!(writer, "nothing to commit, working tree clean")?;
        }

        Ok(())
    }

    fn describe(diff: &HashDiff) -> String {
        let verb = match &diff.status {
            DiffStatus::Added => "new file",
            DiffStatus::Deleted => "deleted",
            DiffStatus::Modified => "modified",
            DiffStatus::TypeChanged => "typechange",
            DiffStatus::Renamed { .. } => "renamed",
            DiffStatus::Copied { .. } => "copied",
        };

        format!("{}:   {}", verb, diff.path.display())
    }
}
