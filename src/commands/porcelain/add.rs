use crate::areas::repository::Repository;
use crate::artifacts::index::index_entry::IndexEntry;
use std::path::PathBuf;
use tracing::debug;

impl Repository {
    /// Stage files into the index
    ///
    /// Hashes each file into a blob, stores it, and records the entry with
    /// fresh stat metadata. Pathspecs that match nothing are skipped.
    pub async fn add(&mut self, paths: &[String]) -> anyhow::Result<()> {
        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        for pathspec in paths {
            let root = if pathspec == "." {
                None
            } else {
                Some(PathBuf::from(pathspec))
            };

            let files = match self.workspace().list_files(root) {
                Ok(files) => files,
                Err(_) => {
                    debug!(pathspec, "pathspec matched no files, skipping");
                    continue;
                }
            };

            for file in files {
                // unreadable files are skipped rather than failing the batch
                let Ok(blob) = self.workspace().parse_blob(&file) else {
                    continue;
                };

                let oid = self.database().store(&blob)?;
                let stat = self.workspace().stat_file(&file)?;
                index.add(IndexEntry::from_parts(file, oid, stat))?;
            }
        }

        index.write_updates()?;

        Ok(())
    }
}
