use crate::areas::refs::HEAD_REF_NAME;
use crate::areas::repository::Repository;
use crate::artifacts::objects::commit::{Author, Commit};
use std::io::Write;

impl Repository {
    /// Record the staged tree as a new commit and advance the current branch
    pub async fn commit(&mut self, message: &str) -> anyhow::Result<()> {
        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        if index.is_empty() {
            anyhow::bail!("nothing to commit (the index is empty)");
        }

        let tree_oid = index.write_tree(self.database())?;
        index.write_updates()?;

        let parent = self.refs().read_head()?;
        let author = Author::load_from_env("GIT_AUTHOR");
        let committer = Author::load_from_env("GIT_COMMITTER");

        let commit = Commit::new(
            parent.clone().into_iter().collect(),
            tree_oid,
            author,
            committer,
            message.to_string(),
        );
        let commit_oid = self.database().store(&commit)?;

        let reflog_message = if parent.is_some() {
            format!("commit: {}", commit.short_message())
        } else {
            format!("commit (initial): {}", commit.short_message())
        };
        self.refs().update(
            HEAD_REF_NAME,
            commit_oid.clone(),
            parent.as_ref(),
            &reflog_message,
            false,
        )?;

        let branch = self
            .refs()
            .current_branch()?
            .map(|branch| branch.to_string())
            .unwrap_or_else(|| "detached HEAD".to_string());
        let root_marker = if parent.is_none() { " (root-commit)" } else { "" };

        writeln!(
            self.writer(),
            "[{}{} {}] {}",
            branch,
            root_marker,
            commit_oid.to_short_oid(),
            commit.short_message()
        )?;

        Ok(())
    }
}
