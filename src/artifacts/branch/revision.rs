//! Revision specifier parsing and resolution
//!
//! A revision is a textual specifier identifying an object. Parsing builds a
//! small expression tree; resolution walks it against the repository and
//! returns a tagged [`Commitish`] naming what the specifier landed on, so
//! callers can distinguish "a branch was named" (checkout moves HEAD
//! symbolically) from "a raw commit was named" (checkout detaches).
//!
//! ## Grammar
//!
//! - bare names, searched against a fixed priority list: the name itself,
//!   `refs/<name>`, `refs/tags/<name>`, `refs/heads/<name>`,
//!   `refs/remotes/<name>`, `refs/remotes/<name>/HEAD`
//! - `@` as an alias for `HEAD`
//! - `<rev>^` (first parent, repeatable), `<rev>~N` (N-th first-parent
//!   ancestor)
//! - `<ref>@{N}` (N-th previous reflog value)
//! - `<rev>^{commit}` / `<rev>^{tree}` peel operators
//! - full digests, or abbreviated digests of 4+ hex characters

use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::branch::{
    ANCESTOR_REGEX, PARENT_REGEX, PEEL_REGEX, REF_ALIASES, REFLOG_REGEX, REF_SEARCH_PATTERNS,
};
use crate::artifacts::core::error::EngineError;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::areas::refs::{HEAD_REF_NAME, RefValue};
use anyhow::Context;

/// What a revision peels down to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeelTarget {
    Commit,
    Tree,
}

/// A parsed revision specifier
#[derive(Debug, Clone)]
pub enum Revision {
    /// A ref name or (possibly abbreviated) digest, decided at resolution
    RefOrOid(String),
    /// The first parent of a revision (e.g., `HEAD^`)
    Parent(Box<Revision>),
    /// The Nth first-parent ancestor of a revision (e.g., `HEAD~3`)
    Ancestor(Box<Revision>, usize),
    /// The Nth previous value of a ref (e.g., `main@{2}`)
    Reflog(String, usize),
    /// A peel operator (e.g., `v1.0^{commit}`)
    Peel(Box<Revision>, PeelTarget),
}

/// A resolved revision, tagged with what kind of name produced it
///
/// The tag matters to checkout: naming a branch moves HEAD symbolically,
/// anything else detaches.
#[derive(Debug, Clone)]
pub enum Commitish {
    /// A raw digest was given
    Direct(ObjectId),
    /// A branch ref was named
    Branch(BranchName, ObjectId),
    /// A tag ref was named
    Tag(String, ObjectId),
    /// HEAD was named while detached
    Detached(ObjectId),
}

impl Commitish {
    pub fn object_id(&self) -> &ObjectId {
        match self {
            Commitish::Direct(oid)
            | Commitish::Branch(_, oid)
            | Commitish::Tag(_, oid)
            | Commitish::Detached(oid) => oid,
        }
    }

    /// The branch this revision names, if it names one
    pub fn branch(&self) -> Option<&BranchName> {
        match self {
            Commitish::Branch(name, _) => Some(name),
            _ => None,
        }
    }

    /// Peel to a commit, following tag objects
    pub fn resolve_to_commit(&self, repository: &Repository) -> anyhow::Result<(ObjectId, Commit)> {
        let mut oid = self.object_id().clone();

        // annotated tags chain at most a few levels deep in practice;
        // bound the walk to stay safe against self-referential objects
        for _ in 0..10 {
            match repository.database().get_object_type(&oid)? {
                ObjectType::Commit => {
                    let commit = repository
                        .database()
                        .parse_object_as_commit(&oid)?
                        .with_context(|| format!("object {} is not a commit", oid))?;
                    return Ok((oid, commit));
                }
                ObjectType::Tag => {
                    let tag = repository
                        .database()
                        .parse_object_as_tag(&oid)?
                        .with_context(|| format!("object {} is not a tag", oid))?;
                    oid = tag.target().clone();
                }
                other => {
                    return Err(EngineError::BadRevision(format!(
                        "object {} is a {}, not a commit",
                        oid.to_short_oid(),
                        other
                    ))
                    .into());
                }
            }
        }

        Err(EngineError::BadRevision(format!("tag chain too deep at {}", self.object_id())).into())
    }

    /// Peel to a tree digest
    ///
    /// Commits peel to their tree; tags peel through to the commit first;
    /// a direct tree digest is returned unchanged.
    pub fn resolve_to_tree(&self, repository: &Repository) -> anyhow::Result<ObjectId> {
        let oid = self.object_id();

        match repository.database().get_object_type(oid)? {
            ObjectType::Tree => Ok(oid.clone()),
            ObjectType::Blob => Err(EngineError::BadRevision(format!(
                "object {} is a blob, not a tree-ish",
                oid.to_short_oid()
            ))
            .into()),
            ObjectType::Commit | ObjectType::Tag => {
                let (_, commit) = self.resolve_to_commit(repository)?;
                Ok(commit.tree_oid().clone())
            }
        }
    }
}

impl Revision {
    pub fn try_parse(revision: &str) -> anyhow::Result<Revision> {
        let peel_re = regex::Regex::new(PEEL_REGEX).context("invalid peel regex")?;
        if let Some(caps) = peel_re.captures(revision) {
            let base = Self::try_parse(&caps[1])?;
            let target = match &caps[2] {
                "tree" => PeelTarget::Tree,
                _ => PeelTarget::Commit,
            };
            return Ok(Revision::Peel(Box::new(base), target));
        }

        let parent_re = regex::Regex::new(PARENT_REGEX).context("invalid parent regex")?;
        if let Some(caps) = parent_re.captures(revision) {
            let base = Self::try_parse(&caps[1])?;
            return Ok(Revision::Parent(Box::new(base)));
        }

        let ancestor_re = regex::Regex::new(ANCESTOR_REGEX).context("invalid ancestor regex")?;
        if let Some(caps) = ancestor_re.captures(revision) {
            let base = Self::try_parse(&caps[1])?;
            let generations: usize = caps[2]
                .parse()
                .with_context(|| format!("failed to parse generations in revision: {revision}"))?;
            return Ok(Revision::Ancestor(Box::new(base), generations));
        }

        let reflog_re = regex::Regex::new(REFLOG_REGEX).context("invalid reflog regex")?;
        if let Some(caps) = reflog_re.captures(revision) {
            let base_name = &caps[1];
            let name = REF_ALIASES
                .get(base_name)
                .copied()
                .unwrap_or(base_name)
                .to_string();
            let selector: usize = caps[2]
                .parse()
                .with_context(|| format!("failed to parse reflog selector: {revision}"))?;
            return Ok(Revision::Reflog(name, selector));
        }

        let resolved_name = *REF_ALIASES.get(revision).unwrap_or(&revision);
        if !Self::valid_name(resolved_name) {
            return Err(EngineError::BadRevision(revision.to_string()).into());
        }

        Ok(Revision::RefOrOid(resolved_name.to_string()))
    }

    fn valid_name(name: &str) -> bool {
        name == HEAD_REF_NAME
            || name.starts_with("refs/")
            || Self::looks_like_oid(name)
            || BranchName::try_parse(name.to_string()).is_ok()
    }

    /// Resolve the parsed revision against the repository
    pub fn resolve(&self, repository: &Repository) -> anyhow::Result<Commitish> {
        match self {
            Revision::RefOrOid(name) => Self::resolve_name(name, repository),
            Revision::Parent(base) => {
                let (oid, commit) = base.resolve(repository)?.resolve_to_commit(repository)?;
                let parent = commit
                    .parent()
                    .ok_or_else(|| {
                        EngineError::NotFound(format!("parent of commit {}", oid.to_short_oid()))
                    })?
                    .clone();
                Ok(Commitish::Direct(parent))
            }
            Revision::Ancestor(base, generations) => {
                let mut current = base.resolve(repository)?;
                for _ in 0..*generations {
                    let (oid, commit) = current.resolve_to_commit(repository)?;
                    let parent = commit
                        .parent()
                        .ok_or_else(|| {
                            EngineError::NotFound(format!(
                                "ancestor beyond root commit {}",
                                oid.to_short_oid()
                            ))
                        })?
                        .clone();
                    current = Commitish::Direct(parent);
                }
                Ok(current)
            }
            Revision::Reflog(name, selector) => {
                let full_name = Self::find_ref_name(name, repository)?.ok_or_else(|| {
                    EngineError::NotFound(format!("ref '{}'", name))
                })?;
                let entries = repository.refs().read_reflog(&full_name)?;
                let entry = entries.get(*selector).ok_or_else(|| {
                    EngineError::NotFound(format!(
                        "reflog of '{}' has only {} entries",
                        full_name,
                        entries.len()
                    ))
                })?;
                Ok(Commitish::Direct(entry.new_oid.clone()))
            }
            Revision::Peel(base, target) => {
                let resolved = base.resolve(repository)?;
                match target {
                    PeelTarget::Commit => {
                        let (oid, _) = resolved.resolve_to_commit(repository)?;
                        Ok(Commitish::Direct(oid))
                    }
                    PeelTarget::Tree => {
                        let tree_oid = resolved.resolve_to_tree(repository)?;
                        Ok(Commitish::Direct(tree_oid))
                    }
                }
            }
        }
    }

    /// Search the ref priority list for a bare name
    fn find_ref_name(name: &str, repository: &Repository) -> anyhow::Result<Option<String>> {
        for pattern in REF_SEARCH_PATTERNS {
            let candidate = pattern.replace("{}", name);
            if repository.refs().read(&candidate)?.is_some() {
                return Ok(Some(candidate));
            }
        }

        Ok(None)
    }

    fn resolve_name(name: &str, repository: &Repository) -> anyhow::Result<Commitish> {
        if name == HEAD_REF_NAME {
            return match repository.refs().read(HEAD_REF_NAME)? {
                Some(RefValue::Symbolic(target)) => {
                    let oid = repository.refs().try_resolve(HEAD_REF_NAME)?.ok_or_else(|| {
                        EngineError::NotFound(format!("branch '{}' has no commits yet", target))
                    })?;
                    let branch = BranchName::from_ref_name(&target)?;
                    Ok(Commitish::Branch(branch, oid))
                }
                Some(RefValue::Direct(oid)) => Ok(Commitish::Detached(oid)),
                None => Err(EngineError::NotFound("HEAD".to_string()).into()),
            };
        }

        if let Some(full_name) = Self::find_ref_name(name, repository)? {
            let oid = repository.refs().resolve(&full_name)?;

            if full_name.starts_with("refs/tags/") {
                return Ok(Commitish::Tag(name.to_string(), oid));
            }
            if let Some(branch) = full_name.strip_prefix("refs/heads/") {
                return Ok(Commitish::Branch(
                    BranchName::try_parse(branch.to_string())?,
                    oid,
                ));
            }
            return Ok(Commitish::Direct(oid));
        }

        if Self::looks_like_oid(name) {
            return Self::resolve_oid(name, repository);
        }

        Err(EngineError::NotFound(format!(
            "unknown revision or path not in the working tree: '{}'",
            name
        ))
        .into())
    }

    fn resolve_oid(oid_str: &str, repository: &Repository) -> anyhow::Result<Commitish> {
        let kind = repository.database().kind();

        // full digests skip the prefix scan
        if oid_str.len() == kind.hex_len() {
            let oid = ObjectId::try_parse(oid_str.to_string())?;
            if !repository.database().has(&oid) {
                return Err(EngineError::NotFound(format!("object {}", oid)).into());
            }
            return Ok(Commitish::Direct(oid));
        }

        let matches = repository.database().find_objects_by_prefix(oid_str)?;
        match matches.len() {
            0 => Err(EngineError::NotFound(format!(
                "unknown revision or path not in the working tree: '{}'",
                oid_str
            ))
            .into()),
            1 => Ok(Commitish::Direct(matches[0].clone())),
            _ => {
                let mut message = format!("short object ID {} is ambiguous", oid_str);
                message.push_str("\nhint: The candidates are:");
                for candidate in &matches {
                    let object_type = repository
                        .database()
                        .get_object_type(candidate)
                        .map(|t| t.to_string())
                        .unwrap_or_else(|_| "unknown".to_string());
                    message.push_str(&format!(
                        "\nhint:   {} {}",
                        candidate.to_short_oid(),
                        object_type
                    ));
                }
                Err(EngineError::AmbiguousRef(message).into())
            }
        }
    }

    fn looks_like_oid(s: &str) -> bool {
        // at least 4 characters, at most a full digest, all hex
        s.len() >= 4 && s.len() <= 64 && s.chars().all(|c| c.is_ascii_hexdigit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_simple_ref() {
        let result = Revision::try_parse("main").unwrap();
        assert!(matches!(result, Revision::RefOrOid(name) if name == "main"));
    }

    #[test]
    fn test_parse_head_alias() {
        let result = Revision::try_parse("@").unwrap();
        assert!(matches!(result, Revision::RefOrOid(name) if name == "HEAD"));
    }

    #[test]
    fn test_parse_parent() {
        let result = Revision::try_parse("main^").unwrap();
        let Revision::Parent(base) = result else {
            panic!("Expected Parent variant");
        };
        assert!(matches!(*base, Revision::RefOrOid(name) if name == "main"));
    }

    #[test]
    fn test_parse_nested_parent() {
        let result = Revision::try_parse("main^^").unwrap();
        let Revision::Parent(first) = result else {
            panic!("Expected Parent variant");
        };
        let Revision::Parent(second) = *first else {
            panic!("Expected nested Parent variant");
        };
        assert!(matches!(*second, Revision::RefOrOid(name) if name == "main"));
    }

    #[test]
    fn test_parse_ancestor() {
        let result = Revision::try_parse("main~3").unwrap();
        let Revision::Ancestor(base, generations) = result else {
            panic!("Expected Ancestor variant");
        };
        assert_eq!(generations, 3);
        assert!(matches!(*base, Revision::RefOrOid(name) if name == "main"));
    }

    #[test]
    fn test_parse_reflog_selector() {
        let result = Revision::try_parse("main@{2}").unwrap();
        let Revision::Reflog(name, selector) = result else {
            panic!("Expected Reflog variant");
        };
        assert_eq!(name, "main");
        assert_eq!(selector, 2);
    }

    #[test]
    fn test_parse_head_reflog_via_alias() {
        let result = Revision::try_parse("@@{0}").unwrap();
        let Revision::Reflog(name, selector) = result else {
            panic!("Expected Reflog variant");
        };
        assert_eq!(name, "HEAD");
        assert_eq!(selector, 0);
    }

    #[test]
    fn test_parse_peel_to_tree() {
        let result = Revision::try_parse("HEAD^{tree}").unwrap();
        let Revision::Peel(base, target) = result else {
            panic!("Expected Peel variant");
        };
        assert_eq!(target, PeelTarget::Tree);
        assert!(matches!(*base, Revision::RefOrOid(name) if name == "HEAD"));
    }

    #[test]
    fn test_parse_peel_to_commit_over_ancestor() {
        let result = Revision::try_parse("v1.0~2^{commit}").unwrap();
        let Revision::Peel(base, target) = result else {
            panic!("Expected Peel variant");
        };
        assert_eq!(target, PeelTarget::Commit);
        assert!(matches!(*base, Revision::Ancestor(_, 2)));
    }

    #[test]
    fn test_parse_full_oid_is_ref_or_oid() {
        let oid = "a".repeat(40);
        let result = Revision::try_parse(&oid).unwrap();
        assert!(matches!(result, Revision::RefOrOid(name) if name == oid));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Revision::try_parse("").is_err());
        assert!(Revision::try_parse("invalid name").is_err());
        assert!(Revision::try_parse(".invalid").is_err());
        assert!(Revision::try_parse("branch.lock").is_err());
        assert!(Revision::try_parse("feature..name").is_err());
    }

    #[test]
    fn test_parse_qualified_ref_name() {
        let result = Revision::try_parse("refs/heads/main").unwrap();
        assert!(matches!(result, Revision::RefOrOid(name) if name == "refs/heads/main"));
    }

    // Strategy for valid branch names (simplified)
    fn valid_branch_name_strategy() -> impl Strategy<Value = String> {
        prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_/-]*[a-zA-Z0-9]")
            .unwrap()
            .prop_filter("Must not contain invalid patterns", |s| {
                !s.contains("..")
                    && !s.ends_with(".lock")
                    && !s.contains("//")
                    && !s.contains("/.")
                    && !s.is_empty()
                    && s.len() < 256
            })
    }

    proptest! {
        #[test]
        fn prop_valid_branch_names_parse(name in valid_branch_name_strategy()) {
            let result = Revision::try_parse(&name);
            prop_assert!(result.is_ok());
        }

        #[test]
        fn prop_parent_suffix_nests(name in valid_branch_name_strategy(), count in 1usize..5) {
            let mut revision_str = name.clone();
            for _ in 0..count {
                revision_str.push('^');
            }

            let mut current = Revision::try_parse(&revision_str).unwrap();
            for _ in 0..count {
                match current {
                    Revision::Parent(base) => current = *base,
                    _ => prop_assert!(false, "Expected Parent variant"),
                }
            }
            prop_assert!(matches!(current, Revision::RefOrOid(n) if n == name));
        }

        #[test]
        fn prop_ancestor_suffix_parses(
            name in valid_branch_name_strategy(),
            generations in 0usize..100
        ) {
            let revision_str = format!("{}~{}", name, generations);
            let parsed = Revision::try_parse(&revision_str).unwrap();

            match parsed {
                Revision::Ancestor(base, parsed_generations) => {
                    prop_assert_eq!(parsed_generations, generations);
                    prop_assert!(matches!(*base, Revision::RefOrOid(n) if n == name));
                }
                _ => prop_assert!(false, "Expected Ancestor variant"),
            }
        }

        #[test]
        fn prop_valid_oids_parse(oid in "[0-9a-f]{4,40}") {
            let result = Revision::try_parse(&oid);
            prop_assert!(result.is_ok());
        }
    }
}
