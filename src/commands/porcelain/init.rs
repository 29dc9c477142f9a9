use crate::areas::repository::Repository;
use crate::areas::refs::HEAD_REF_NAME;
use crate::artifacts::objects::object_id::DigestKind;
use anyhow::Context;
use std::io::Write;

/// Default branch new repositories point HEAD at
pub const DEFAULT_BRANCH: &str = "master";

impl Repository {
    /// Initialize the repository skeleton
    ///
    /// Creates `objects/`, `refs/heads/`, `logs/`, a symbolic HEAD pointing
    /// at the default branch, and a config declaring the digest variant.
    /// Re-running on an existing repository is harmless.
    pub async fn init(&mut self, object_format: Option<&str>) -> anyhow::Result<()> {
        let kind = match object_format {
            Some(value) => DigestKind::try_parse(value)?,
            None => self.kind(),
        };

        for dir in ["objects", "objects/pack", "refs/heads", "logs"] {
            std::fs::create_dir_all(self.git_path().join(dir))
                .with_context(|| format!("failed to create {}", dir))?;
        }

        let head_path = self.git_path().join(HEAD_REF_NAME);
        if !head_path.exists() {
            std::fs::write(
                &head_path,
                format!("ref: refs/heads/{}\n", DEFAULT_BRANCH),
            )
            .context("failed to write HEAD")?;
        }

        let config_path = self.git_path().join("config");
        if !config_path.exists() {
            let format_version = if kind == DigestKind::Sha1 { 0 } else { 1 };
            let mut config = format!(
                "[core]\n\trepositoryformatversion = {}\n\tbare = false\n",
                format_version
            );
            if kind != DigestKind::Sha1 {
                config.push_str(&format!(
                    "[extensions]\n\tobjectformat = {}\n",
                    kind.config_value()
                ));
            }
            std::fs::write(&config_path, config).context("failed to write config")?;
        }

        writeln!(
            self.writer(),
            "Initialized empty repository in {}",
            self.git_path().display()
        )?;

        Ok(())
    }
}
