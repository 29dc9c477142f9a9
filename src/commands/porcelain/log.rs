use crate::areas::repository::Repository;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::core::cancel::CancelToken;
use crate::artifacts::log::rev_list::RevList;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use colored::Colorize;
use std::io::Write;

impl Repository {
    /// Show commit history from a revision (HEAD by default)
    ///
    /// Commits print newest-first in commit-date order, each visited once,
    /// with sibling branches merged into a single stream.
    pub async fn log(&mut self, revision: Option<&str>) -> anyhow::Result<()> {
        let revision = Revision::try_parse(revision.unwrap_or("HEAD"))?;
        let start = revision.resolve(self)?;

        let rev_list = RevList::new(self, &start, CancelToken::new())?;
        for item in rev_list {
            let (oid, commit) = item?;
            self.print_commit(&oid, &commit)?;
        }

        Ok(())
    }

    /// Medium-format commit output
    fn print_commit(&self, oid: &ObjectId, commit: &Commit) -> anyhow::Result<()> {
        let mut writer = self.writer();

        writeln!(writer, "{}", format!("commit {}", oid).yellow())?;

        if commit.is_merge() {
            let parents = commit
                .parents()
                .iter()
                .map(|parent| parent.to_short_oid())
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(writer, "Merge: {}", parents)?;
        }

        writeln!(writer, "Author: {}", commit.author().display_name())?;
        writeln!(writer, "Date:   {}", commit.author().readable_timestamp())?;
        writeln!(writer)?;

        for line in commit.message().lines() {
            writeln!(writer, "    {}", line)?;
        }
        writeln!(writer)?;

        Ok(())
    }
}
