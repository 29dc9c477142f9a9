//! Repository abstraction and coordination
//!
//! The `Repository` type coordinates all repository operations. It acts as a
//! facade over the lower-level components (database, index, workspace, refs)
//! and hosts the porcelain command implementations.
//!
//! ## Discovery
//!
//! The repository directory defaults to `<root>/.git`; `GIT_DIR` overrides
//! it, and `GIT_WORK_TREE` overrides the working tree root. The `config`
//! file is consulted for the digest variant
//! (`extensions.objectformat`) and the index version to write
//! (`index.version`).

use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::refs::Refs;
use crate::areas::workspace::Workspace;
use crate::artifacts::index::DEFAULT_VERSION;
use crate::artifacts::objects::object_id::DigestKind;
use std::cell::RefCell;
use std::cell::RefMut;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Repository directory name
const GIT_DIR: &str = ".git";

/// Object database directory name
const DATABASE_DIR: &str = "objects";

/// Index file name
const INDEX_FILE: &str = "index";

/// A repository
///
/// Coordinates all repository operations and provides access to the
/// database, index, workspace, and refs subsystems. This is the main entry
/// point for all commands.
pub struct Repository {
    /// Working tree root
    path: Box<Path>,
    /// Repository directory (typically `<root>/.git`)
    git_path: Box<Path>,
    /// Digest variant declared by the repository
    kind: DigestKind,
    /// Output writer (stdout in production, a buffer in tests)
    writer: RefCell<Box<dyn std::io::Write>>,
    /// Index (staging area) with serialized access
    index: Arc<Mutex<Index>>,
    /// Object database
    database: Database,
    /// Working directory
    workspace: Workspace,
    /// Reference manager
    refs: Refs,
}

impl Repository {
    pub fn new(path: PathBuf, writer: Box<dyn std::io::Write>) -> anyhow::Result<Self> {
        if !path.exists() {
            std::fs::create_dir_all(&path)?;
        }
        let path = path.canonicalize()?;

        let path = match std::env::var("GIT_WORK_TREE") {
            Ok(work_tree) => PathBuf::from(work_tree).canonicalize()?,
            Err(_) => path,
        };
        let git_path = match std::env::var("GIT_DIR") {
            Ok(git_dir) => {
                let git_dir = PathBuf::from(git_dir);
                if git_dir.is_absolute() {
                    git_dir
                } else {
                    path.join(git_dir)
                }
            }
            Err(_) => path.join(GIT_DIR),
        };

        let (kind, index_version) = Self::read_config(&git_path)?;

        let index = Index::new(
            git_path.join(INDEX_FILE).into_boxed_path(),
            kind,
            index_version,
        );
        let database = Database::new(git_path.join(DATABASE_DIR).into_boxed_path(), kind);
        let workspace = Workspace::new(path.clone().into_boxed_path());
        let refs = Refs::new(git_path.clone().into_boxed_path(), kind);

        Ok(Repository {
            path: path.into_boxed_path(),
            git_path: git_path.into_boxed_path(),
            kind,
            writer: RefCell::new(writer),
            index: Arc::new(Mutex::new(index)),
            database,
            workspace,
            refs,
        })
    }

    /// Minimal config scan: digest variant and index version
    fn read_config(git_path: &Path) -> anyhow::Result<(DigestKind, u32)> {
        let config_path = git_path.join("config");
        let mut kind = DigestKind::default();
        let mut index_version = DEFAULT_VERSION;

        let Ok(content) = std::fs::read_to_string(&config_path) else {
            return Ok((kind, index_version));
        };

        let mut section = String::new();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].trim().to_lowercase();
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match (section.as_str(), key.as_str()) {
                ("extensions", "objectformat") => {
                    kind = DigestKind::try_parse(value)?;
                }
                ("index", "version") => {
                    if let Ok(version) = value.parse() {
                        index_version = version;
                    }
                }
                _ => {}
            }
        }

        Ok((kind, index_version))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn git_path(&self) -> &Path {
        &self.git_path
    }

    pub fn kind(&self) -> DigestKind {
        self.kind
    }

    pub fn writer(&'_ self) -> RefMut<'_, Box<dyn std::io::Write>> {
        self.writer.borrow_mut()
    }

    pub fn index(&self) -> Arc<Mutex<Index>> {
        self.index.clone()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }
}
