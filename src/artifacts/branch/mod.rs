//! Branch and revision management
//!
//! This module handles:
//! - Branch name validation and parsing
//! - Revision specification parsing (refs, digests, parent notation,
//!   reflog selectors, peel operators)
//! - Resolution of parsed revisions against the repository
//!
//! ## Revision Syntax
//!
//! - Branch names: `main`, `feature/new-feature`
//! - Aliases: `@` → `HEAD`
//! - First parent notation: `HEAD^`, `main^` (repeatable)
//! - Ancestor notation: `HEAD~3`, `main~5` (follows first parents)
//! - Reflog selectors: `main@{2}` (N-th previous value of the ref)
//! - Peel operators: `v1.0^{commit}`, `HEAD^{tree}`
//! - Digests: full, or abbreviated to a unique prefix of 4+ characters

pub mod branch_name;
pub mod revision;

/// Regex pattern for invalid characters in branch names
pub const INVALID_BRANCH_NAME_REGEX: &str =
    r"^\.|\/\.|\.\.|^\/|\/$|\.lock$|@\{|[\x00-\x20\*:\?\[\\~\^\x7f]";

/// Regex pattern for first parent notation (e.g., "HEAD^")
pub const PARENT_REGEX: &str = r"^(.+)\^$";

/// Regex pattern for ancestor notation (e.g., "HEAD~3")
pub const ANCESTOR_REGEX: &str = r"^(.+)\~(\d+)$";

/// Regex pattern for reflog selectors (e.g., "main@{2}")
pub const REFLOG_REGEX: &str = r"^(.+)@\{(\d+)\}$";

/// Regex pattern for peel operators (e.g., "v1.0^{commit}")
pub const PEEL_REGEX: &str = r"^(.+)\^\{(tree|commit)\}$";

/// Map of revision aliases to their expansions
pub const REF_ALIASES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "@" => "HEAD",
};

/// Ref search priority for bare names, tried in order
pub const REF_SEARCH_PATTERNS: [&str; 6] = [
    "{}",
    "refs/{}",
    "refs/tags/{}",
    "refs/heads/{}",
    "refs/remotes/{}",
    "refs/remotes/{}/HEAD",
];
