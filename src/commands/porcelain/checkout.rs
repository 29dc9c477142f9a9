use crate::areas::refs::HEAD_REF_NAME;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::branch::revision::{Commitish, Revision};
use crate::artifacts::checkout::read_tree::{ReadTree, ReadTreeOptions};
use crate::artifacts::core::cancel::CancelToken;
use crate::artifacts::core::error::EngineError;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::diff_target::DiffTarget;
use crate::artifacts::diff::tree_diff::{
    ContentLoader, DiffOptions, DiffStatus, compare_entry_sets, index_entry_set,
    tree_entry_set, worktree_entry_set,
};
use crate::artifacts::diff::unified::{PatchFormat, write_patch};
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::patch::apply::{ApplyOptions, PatchApplier};
use crate::artifacts::patch::parse::{FilePatch, Patch, PatchHunk};
use crate::artifacts::patch::temp_patch::TempPatch;
use anyhow::Context;
use std::io::Write;
use std::path::PathBuf;

/// What the hunk-selection collaborator decided for one hunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HunkDecision {
    /// Discard this change from the working tree
    Discard,
    /// Keep the change
    Keep,
    /// Stop the whole selection; nothing is written
    Quit,
}

/// External hunk-selection collaborator
///
/// The engine treats whatever this returns as authoritative; the
/// interactive prompt lives outside the engine.
pub type HunkFilter<'f> = &'f mut dyn FnMut(&FilePatch, &PatchHunk) -> anyhow::Result<HunkDecision>;

/// One invocation of the checkout command, explicitly enumerated
#[derive(Debug, Default)]
pub struct CheckoutRequest {
    /// The thing to check out (branch, commit, tree-ish)
    pub target: Option<String>,
    /// Create this branch first (`-b`)
    pub new_branch: Option<String>,
    /// Interactive patch mode (`-p`)
    pub patch: bool,
    /// Overwrite local modifications without checks (`-f`)
    pub force: bool,
    /// Restrict to these paths
    pub paths: Vec<PathBuf>,
}

impl Repository {
    /// The checkout command
    ///
    /// Dispatches over the documented variations: switching to a commit or
    /// branch, creating a branch first (`-b`), restoring specific paths, and
    /// the interactive patch mode (`-p`).
    pub async fn checkout(
        &mut self,
        request: CheckoutRequest,
        hunk_filter: Option<HunkFilter<'_>>,
    ) -> anyhow::Result<()> {
        if request.patch {
            return self.checkout_patch(request.paths, hunk_filter).await;
        }

        if let Some(new_branch) = &request.new_branch {
            return self
                .checkout_new_branch(new_branch, request.target.as_deref())
                .await;
        }

        if !request.paths.is_empty() {
            return self
                .checkout_files(request.target.as_deref(), &request.paths)
                .await;
        }

        let thing = request.target.as_deref().unwrap_or(HEAD_REF_NAME);
        let commitish = Revision::try_parse(thing)?.resolve(self)?;
        self.checkout_commit(&commitish, request.force).await?;

        let mut writer = self.writer();
        match commitish.branch() {
            Some(branch) => writeln!(writer, "Switched to branch '{}'", branch)?,
            None => {
                let (oid, commit) = commitish.resolve_to_commit(self)?;
                writeln!(
                    writer,
                    "HEAD is now at {} {}",
                    oid.to_short_oid(),
                    commit.short_message()
                )?;
            }
        }

        Ok(())
    }

    /// `checkout -b <new> [<start>]`
    async fn checkout_new_branch(
        &mut self,
        new_branch: &str,
        start: Option<&str>,
    ) -> anyhow::Result<()> {
        let branch = BranchName::try_parse(new_branch.to_string())?;
        let start_commitish = Revision::try_parse(start.unwrap_or(HEAD_REF_NAME))?.resolve(self)?;
        let (start_oid, _) = start_commitish.resolve_to_commit(self)?;

        self.refs().create_branch(&branch, start_oid.clone())?;

        let commitish = Commitish::Branch(branch.clone(), start_oid);
        self.checkout_commit(&commitish, false).await?;

        writeln!(self.writer(), "Switched to a new branch '{}'", branch)?;

        Ok(())
    }

    /// Switch index, working tree and HEAD to a commit
    async fn checkout_commit(&self, commitish: &Commitish, force: bool) -> anyhow::Result<()> {
        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        let head_oid = self.refs().read_head()?;
        let head_tree = match &head_oid {
            Some(oid) => {
                let commit = self
                    .database()
                    .parse_object_as_commit(oid)?
                    .ok_or_else(|| anyhow::anyhow!("HEAD {} is not a commit", oid))?;
                Some(commit.tree_oid().clone())
            }
            None => None,
        };

        let (target_oid, target_commit) = commitish.resolve_to_commit(self)?;
        let target_tree = target_commit.tree_oid().clone();

        let options = ReadTreeOptions {
            update: true,
            merge: !force,
            reset: force,
        };
        ReadTree::new(self, options, CancelToken::new()).read_tree(
            &mut index,
            [head_tree.as_ref(), head_tree.as_ref(), Some(&target_tree)],
        )?;

        // the tree is in place; now move HEAD
        let moved_from = self
            .refs()
            .current_branch()?
            .map(|branch| branch.to_string())
            .or_else(|| head_oid.as_ref().map(|oid| oid.to_short_oid()))
            .unwrap_or_else(|| HEAD_REF_NAME.to_string());

        match commitish.branch() {
            Some(branch) => {
                let message = format!("checkout: moving from {} to {}", moved_from, branch);
                self.refs()
                    .set_symbolic(HEAD_REF_NAME, &branch.to_ref_name(), &message)?;
            }
            None => {
                let message = format!("checkout: moving from {} to {}", moved_from, target_oid);
                self.refs().update(
                    HEAD_REF_NAME,
                    target_oid.clone(),
                    head_oid.as_ref(),
                    &message,
                    true,
                )?;
            }
        }

        Ok(())
    }

    /// `checkout [<tree-ish>] -- <paths>…`: force-restore specific files
    async fn checkout_files(
        &self,
        target: Option<&str>,
        paths: &[PathBuf],
    ) -> anyhow::Result<()> {
        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        // with a tree-ish the files come from that tree (and are staged);
        // without one they come from the index
        let (source_set, stage_restored) = match target {
            Some(thing) => {
                let tree_oid = Revision::try_parse(thing)?
                    .resolve(self)?
                    .resolve_to_tree(self)?;
                (tree_entry_set(self.database(), Some(&tree_oid))?, true)
            }
            None => (index_entry_set(&index), false),
        };

        for path in paths {
            let matching: Vec<(&PathBuf, &DatabaseEntry)> = source_set
                .iter()
                .filter(|(entry_path, _)| entry_path.starts_with(path) || *entry_path == path)
                .collect();

            if matching.is_empty() {
                return Err(EngineError::NotFound(format!(
                    "pathspec '{}' did not match any files",
                    path.display()
                ))
                .into());
            }

            for (file_path, entry) in matching {
                let blob = self
                    .database()
                    .parse_object_as_blob(&entry.oid)?
                    .with_context(|| format!("failed to load blob {}", entry.oid))?;
                self.workspace().write_file(file_path, blob.content(), entry)?;

                if stage_restored {
                    let stat = self.workspace().stat_file(file_path)?;
                    index.add(IndexEntry::from_parts(
                        file_path.clone(),
                        entry.oid.clone(),
                        stat,
                    ))?;
                }
            }
        }

        index.write_updates()?;

        Ok(())
    }

    /// `checkout -p [--] [<paths>…]`: selectively discard worktree changes
    ///
    /// Generates the worktree-vs-index patch, hands each hunk to the
    /// collaborator, recombines the selected hunks into a valid patch, and
    /// applies it in reverse. An empty selection (or an absent collaborator)
    /// writes nothing; quitting aborts silently.
    async fn checkout_patch(
        &mut self,
        paths: Vec<PathBuf>,
        hunk_filter: Option<HunkFilter<'_>>,
    ) -> anyhow::Result<()> {
        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        let cancel = CancelToken::new();
        let options = DiffOptions {
            detect_renames: false,
            paths,
            ..Default::default()
        };

        let index_set = index_entry_set(&index);
        let worktree_set = worktree_entry_set(self.workspace(), &index, self.kind())?;

        let database_loader: ContentLoader = &|_: &std::path::Path, oid: &ObjectId| {
            let blob = self
                .database()
                .parse_object_as_blob(oid)?
                .ok_or_else(|| anyhow::anyhow!("object {} is not a blob", oid))?;
            Ok(blob.content().clone())
        };
        let worktree_loader: ContentLoader =
            &|path: &std::path::Path, _: &ObjectId| self.workspace().read_file_bytes(path);

        let diffs = compare_entry_sets(
            &index_set,
            &worktree_set,
            &options,
            database_loader,
            worktree_loader,
            &cancel,
        )?;

        // generate the patch text exactly as `diff` would, minus color
        let mut patch_text = Vec::new();
        let format = PatchFormat::default();
        for diff in &diffs {
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
            let b = if diff.new_oid.is_some() {
                DiffTarget::from_worktree(&diff.path, self.workspace(), self.kind())?
            } else {
                DiffTarget::from_nothing(&diff.path, self.kind())
            };
            write_patch(&mut patch_text, &a, &b, &format)?;
        }

        if patch_text.is_empty() {
            return Ok(()); // nothing to discard
        }

        let patch = Patch::parse(std::str::from_utf8(&patch_text)?)?;
        let Some(hunk_filter) = hunk_filter else {
            return Ok(()); // no collaborator: nothing selected, nothing done
        };

        let mut selected_files = Vec::new();
        for file in &patch.files {
            let mut survivors = Vec::new();
            for hunk in &file.hunks {
                match hunk_filter(file, hunk)? {
                    HunkDecision::Discard => survivors.push(hunk.clone()),
                    HunkDecision::Keep => {}
                    HunkDecision::Quit => return Ok(()), // intentional abort
                }
            }
            if !survivors.is_empty() {
                selected_files.push(file.recombine(survivors));
            }
        }

        if selected_files.is_empty() {
            return Ok(()); // empty selection performs no writes
        }

        let recombined = Patch {
            files: selected_files,
        };

        // route the patch through a temp file so aborted runs leave nothing
        let mut temp_patch = TempPatch::create_in(self.git_path())?;
        temp_patch.write_all(recombined.render().as_bytes())?;
        let parsed = Patch::parse(&temp_patch.read_to_string()?)?;

        let applier = PatchApplier::new(
            self,
            ApplyOptions {
                reverse: true,
                cached: false,
            },
            cancel,
        );
        applier.apply(&mut index, &parsed)?;

        Ok(())
    }
}
