use crate::areas::repository::Repository;
use crate::artifacts::core::cancel::CancelToken;
use crate::artifacts::diff::diff_target::DiffTarget;
use crate::artifacts::diff::tree_diff::{
    ContentLoader, DiffOptions, DiffStatus, HashDiff, compare_entry_sets, index_entry_set,
    tree_entry_set, worktree_entry_set,
};
use crate::artifacts::diff::unified::{PatchFormat, write_patch};
use crate::artifacts::objects::object_id::ObjectId;
use std::path::PathBuf;

impl Repository {
    /// Show changes as unified diffs
    ///
    /// The default compares the working tree against the index; `--staged`
    /// (or `--cached`) compares the index against the HEAD tree. Optional
    /// paths restrict the comparison.
    pub async fn diff(&mut self, staged: bool, paths: &[String]) -> anyhow::Result<()> {
        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        let cancel = CancelToken::new();
        let options = DiffOptions {
            paths: paths.iter().map(PathBuf::from).collect(),
            ..Default::default()
        };

        let head_tree = match self.refs().read_head()? {
            Some(head_oid) => {
                let commit = self
                    .database()
                    .parse_object_as_commit(&head_oid)?
                    .ok_or_else(|| anyhow::anyhow!("HEAD {} is not a commit", head_oid))?;
                Some(commit.tree_oid().clone())
            }
            None => None,
        };

        let database_loader: ContentLoader = &|_path: &std::path::Path, oid: &ObjectId| {
            let blob = self
                .database()
                .parse_object_as_blob(oid)?
                .ok_or_else(|| anyhow::anyhow!("object {} is not a blob", oid))?;
            Ok(blob.content().clone())
        };
        let worktree_loader: ContentLoader =
            &|path: &std::path::Path, _oid: &ObjectId| self.workspace().read_file_bytes(path);

        let (old_set, new_set, new_from_worktree) = if staged {
            (
                tree_entry_set(self.database(), head_tree.as_ref())?,
                index_entry_set(&index),
                false,
            )
        } else {
            (
                index_entry_set(&index),
                worktree_entry_set(self.workspace(), &index, self.kind())?,
                true,
            )
        };

        let new_loader = if new_from_worktree {
            worktree_loader
        } else {
            database_loader
        };
        let diffs = compare_entry_sets(
            &old_set,
            &new_set,
            &options,
            database_loader,
            new_loader,
            &cancel,
        )?;

        let format = PatchFormat {
            color: true,
            ..Default::default()
        };
        for diff in &diffs {
            let (a, b) = self.diff_targets(diff, new_from_worktree)?;
            let mut writer = self.writer();
            write_patch(&mut **writer, &a, &b, &format)?;
        }

        Ok(())
    }

    /// Materialize both sides of one changed path
    fn diff_targets(
        &self,
        diff: &HashDiff,
        new_from_worktree: bool,
    ) -> anyhow::Result<(DiffTarget, DiffTarget)> {
        let old_path = match &diff.status {
            DiffStatus::Renamed { from, .. } | DiffStatus::Copied { from } => from.clone(),
            _ => diff.path.clone(),
        };

        let a = match (&diff.old_oid, diff.old_mode) {
            (Some(oid), Some(mode)) => {
                DiffTarget::from_blob(&old_path, oid, mode, self.database())?
            }
            _ => DiffTarget::from_nothing(&diff.path, self.kind()),
        };

        let b = match (&diff.new_oid, diff.new_mode) {
            (Some(oid), Some(mode)) => {
                if new_from_worktree {
                    DiffTarget::from_worktree(&diff.path, self.workspace(), self.kind())?
                } else {
                    DiffTarget::from_blob(&diff.path, oid, mode, self.database())?
                }
            }
            _ => DiffTarget::from_nothing(&diff.path, self.kind()),
        };

        Ok((a, b))
    }
}
