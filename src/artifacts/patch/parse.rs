//! Unified diff parsing
//!
//! Parses the patch text the diff engine emits (and git-compatible patches
//! generally) into a structured model: per-file headers, hunks with their
//! line ranges, and per-line no-newline flags. The model can be reversed,
//! filtered to a subset of hunks, and re-rendered as a valid patch with
//! recomputed ranges.

use crate::artifacts::core::error::EngineError;
use crate::artifacts::diff::unified::NO_NEWLINE_MARKER;
use crate::artifacts::index::entry_mode::EntryMode;
use anyhow::Context;
use std::path::PathBuf;

/// Kind of file-level change a patch describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileChangeKind {
    #[default]
    Modify,
    Create,
    Delete,
    Rename,
}

/// One line of a hunk body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchLine {
    pub kind: PatchLineKind,
    pub text: String,
    /// Set when the `\ No newline at end of file` marker followed this line
    pub no_newline: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchLineKind {
    Context,
    Add,
    Del,
}

impl PatchLine {
    fn new(kind: PatchLineKind, text: &str) -> Self {
        PatchLine {
            kind,
            text: text.to_string(),
            no_newline: false,
        }
    }

    pub fn reversed(&self) -> Self {
        let kind = match self.kind {
            PatchLineKind::Add => PatchLineKind::Del,
            PatchLineKind::Del => PatchLineKind::Add,
            PatchLineKind::Context => PatchLineKind::Context,
        };
        PatchLine {
            kind,
            text: self.text.clone(),
            no_newline: self.no_newline,
        }
    }

    fn render(&self) -> String {
        let sign = match self.kind {
            PatchLineKind::Context => ' ',
            PatchLineKind::Add => '+',
            PatchLineKind::Del => '-',
        };
        format!("{}{}", sign, self.text)
    }
}

/// One hunk: ranges plus body lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchHunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<PatchLine>,
}

impl PatchHunk {
    pub fn reversed(&self) -> Self {
        PatchHunk {
            old_start: self.new_start,
            old_count: self.new_count,
            new_start: self.old_start,
            new_count: self.old_count,
            lines: self.lines.iter().map(PatchLine::reversed).collect(),
        }
    }

    pub fn header(&self) -> String {
        let range = |start: usize, count: usize| {
            if count == 1 {
                format!("{}", start)
            } else {
                format!("{},{}", start, count)
            }
        };
        format!(
            "@@ -{} +{} @@",
            range(self.old_start, self.old_count),
            range(self.new_start, self.new_count)
        )
    }

    fn render(&self, output: &mut String) {
        output.push_str(&self.header());
        output.push('\n');
        for line in &self.lines {
            output.push_str(&line.render());
            output.push('\n');
            if line.no_newline {
                output.push_str(NO_NEWLINE_MARKER);
                output.push('\n');
            }
        }
    }
}

/// Per-file section of a patch
#[derive(Debug, Clone, Default)]
pub struct FilePatch {
    pub old_path: PathBuf,
    pub new_path: PathBuf,
    pub kind: FileChangeKind,
    pub old_mode: Option<EntryMode>,
    pub new_mode: Option<EntryMode>,
    /// Short digests from the `index` line, as written
    pub old_oid: Option<String>,
    pub new_oid: Option<String>,
    pub hunks: Vec<PatchHunk>,
}

impl FilePatch {
    /// The path the patch mutates when applied forward
    pub fn target_path(&self) -> &PathBuf {
        match self.kind {
            FileChangeKind::Delete => &self.old_path,
            _ => &self.new_path,
        }
    }

    pub fn reversed(&self) -> Self {
        let kind = match self.kind {
            FileChangeKind::Create => FileChangeKind::Delete,
            FileChangeKind::Delete => FileChangeKind::Create,
            other => other,
        };

        FilePatch {
            old_path: self.new_path.clone(),
            new_path: self.old_path.clone(),
            kind,
            old_mode: self.new_mode,
            new_mode: self.old_mode,
            old_oid: self.new_oid.clone(),
            new_oid: self.old_oid.clone(),
            hunks: self.hunks.iter().map(PatchHunk::reversed).collect(),
        }
    }

    /// Rebuild this file's section keeping only the given hunks
    ///
    /// Surviving hunks keep their old-side positions; new-side positions are
    /// recomputed from the cumulative drift of the hunks kept before them,
    /// so the result is a valid standalone patch.
    pub fn recombine(&self, survivors: Vec<PatchHunk>) -> FilePatch {
        let mut recombined = FilePatch {
            hunks: Vec::with_capacity(survivors.len()),
            ..self.clone()
        };

        let mut drift: isize = 0;
        for mut hunk in survivors {
            hunk.new_start = (hunk.old_start as isize + drift).max(0) as usize;
            if hunk.old_count == 0 {
                // pure insertion anchors after the old line; the new side
                // starts on the following line
                hunk.new_start += 1;
            }
            drift += hunk.new_count as isize - hunk.old_count as isize;
            recombined.hunks.push(hunk);
        }

        recombined
    }

    fn render(&self, output: &mut String) {
        output.push_str(&format!(
            "diff --git a/{} b/{}\n",
            self.old_path.display(),
            self.new_path.display()
        ));

        match self.kind {
            FileChangeKind::Create => {
                if let Some(mode) = self.new_mode {
                    output.push_str(&format!("new file mode {}\n", mode.as_padded_str()));
                }
            }
            FileChangeKind::Delete => {
                if let Some(mode) = self.old_mode {
                    output.push_str(&format!("deleted file mode {}\n", mode.as_padded_str()));
                }
            }
            FileChangeKind::Rename => {
                output.push_str(&format!("rename from {}\n", self.old_path.display()));
                output.push_str(&format!("rename to {}\n", self.new_path.display()));
            }
            FileChangeKind::Modify => {
                if let (Some(old_mode), Some(new_mode)) = (self.old_mode, self.new_mode)
                    && old_mode != new_mode
                {
                    output.push_str(&format!("old mode {}\n", old_mode.as_padded_str()));
                    output.push_str(&format!("new mode {}\n", new_mode.as_padded_str()));
                }
            }
        }

        if let (Some(old_oid), Some(new_oid)) = (&self.old_oid, &self.new_oid) {
            output.push_str(&format!("index {}..{}\n", old_oid, new_oid));
        }

        if !self.hunks.is_empty() {
            let old_label = match self.kind {
                FileChangeKind::Create => "/dev/null".to_string(),
                _ => format!("a/{}", self.old_path.display()),
            };
            let new_label = match self.kind {
                FileChangeKind::Delete => "/dev/null".to_string(),
                _ => format!("b/{}", self.new_path.display()),
            };
            output.push_str(&format!("--- {}\n", old_label));
            output.push_str(&format!("+++ {}\n", new_label));

            for hunk in &self.hunks {
                hunk.render(output);
            }
        }
    }
}

/// A parsed patch: an ordered list of file sections
#[derive(Debug, Clone, Default)]
pub struct Patch {
    pub files: Vec<FilePatch>,
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn reversed(&self) -> Self {
        Patch {
            files: self.files.iter().map(FilePatch::reversed).collect(),
        }
    }

    pub fn render(&self) -> String {
        let mut output = String::new();
        for file in &self.files {
            file.render(&mut output);
        }
        output
    }

    /// Parse unified diff text
    pub fn parse(text: &str) -> anyhow::Result<Patch> {
        let header_re = regex::Regex::new(r"^diff --git a/(.+) b/(.+)$")
            .context("invalid diff header regex")?;
        let hunk_re = regex::Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@")
            .context("invalid hunk header regex")?;

        let mut patch = Patch::default();
        let mut current: Option<FilePatch> = None;
        let mut current_hunk: Option<PatchHunk> = None;

        let close_hunk =
            |file: &mut Option<FilePatch>, hunk: &mut Option<PatchHunk>| {
                if let (Some(file), Some(hunk)) = (file.as_mut(), hunk.take()) {
                    file.hunks.push(hunk);
                }
            };

        for line in text.lines() {
            if let Some(caps) = header_re.captures(line) {
                close_hunk(&mut current, &mut current_hunk);
                if let Some(done) = current.take() {
                    patch.files.push(done);
                }
                current = Some(FilePatch {
                    old_path: PathBuf::from(&caps[1]),
                    new_path: PathBuf::from(&caps[2]),
                    ..Default::default()
                });
                continue;
            }

            if let Some(caps) = hunk_re.captures(line) {
                close_hunk(&mut current, &mut current_hunk);
                let parse_count = |capture: Option<regex::Match>| {
                    capture
                        .map(|m| m.as_str().parse::<usize>())
                        .transpose()
                        .map(|count| count.unwrap_or(1))
                };
                current_hunk = Some(PatchHunk {
                    old_start: caps[1].parse()?,
                    old_count: parse_count(caps.get(2))?,
                    new_start: caps[3].parse()?,
                    new_count: parse_count(caps.get(4))?,
                    lines: Vec::new(),
                });
                continue;
            }

            if current_hunk.is_some() {
                if line == NO_NEWLINE_MARKER {
                    if let Some(last) = current_hunk
                        .as_mut()
                        .and_then(|hunk| hunk.lines.last_mut())
                    {
                        last.no_newline = true;
                    }
                    continue;
                }

                let needs_more = {
                    let hunk = current_hunk.as_ref().expect("just observed");
                    let consumed_old = hunk
                        .lines
                        .iter()
                        .filter(|l| l.kind != PatchLineKind::Add)
                        .count();
                    let consumed_new = hunk
                        .lines
                        .iter()
                        .filter(|l| l.kind != PatchLineKind::Del)
                        .count();
                    hunk.old_count > consumed_old || hunk.new_count > consumed_new
                };

                if needs_more {
                    let parsed = if let Some(text) = line.strip_prefix('+') {
                        PatchLine::new(PatchLineKind::Add, text)
                    } else if let Some(text) = line.strip_prefix('-') {
                        PatchLine::new(PatchLineKind::Del, text)
                    } else if let Some(text) = line.strip_prefix(' ') {
                        PatchLine::new(PatchLineKind::Context, text)
                    } else if line.is_empty() {
                        PatchLine::new(PatchLineKind::Context, "")
                    } else {
                        return Err(EngineError::Corrupt(format!(
                            "unexpected patch line: {}",
                            line
                        ))
                        .into());
                    };
                    current_hunk
                        .as_mut()
                        .expect("just observed")
                        .lines
                        .push(parsed);
                    continue;
                }

                // counts satisfied: the hunk is done, fall through to headers
                close_hunk(&mut current, &mut current_hunk);
            }

            let Some(file) = current.as_mut() else {
                continue; // preamble outside any file section
            };

            if let Some(mode) = line.strip_prefix("new file mode ") {
                file.kind = FileChangeKind::Create;
                file.new_mode = Some(EntryMode::from_octal_str(mode.trim())?);
            } else if let Some(mode) = line.strip_prefix("deleted file mode ") {
                file.kind = FileChangeKind::Delete;
                file.old_mode = Some(EntryMode::from_octal_str(mode.trim())?);
            } else if let Some(mode) = line.strip_prefix("old mode ") {
                file.old_mode = Some(EntryMode::from_octal_str(mode.trim())?);
            } else if let Some(mode) = line.strip_prefix("new mode ") {
                file.new_mode = Some(EntryMode::from_octal_str(mode.trim())?);
            } else if let Some(path) = line.strip_prefix("rename from ") {
                file.kind = FileChangeKind::Rename;
                file.old_path = PathBuf::from(path);
            } else if let Some(path) = line.strip_prefix("rename to ") {
                file.kind = FileChangeKind::Rename;
                file.new_path = PathBuf::from(path);
            } else if let Some(index_line) = line.strip_prefix("index ") {
                let digests = index_line.split(' ').next().unwrap_or(index_line);
                if let Some((old_oid, new_oid)) = digests.split_once("..") {
                    file.old_oid = Some(old_oid.to_string());
                    file.new_oid = Some(new_oid.to_string());
                }
            } else if let Some(label) = line.strip_prefix("--- ") {
                if label == "/dev/null" {
                    file.kind = FileChangeKind::Create;
                }
            } else if let Some(label) = line.strip_prefix("+++ ") {
                if label == "/dev/null" {
                    file.kind = FileChangeKind::Delete;
                }
            }
        }

        close_hunk(&mut current, &mut current_hunk);
        if let Some(done) = current.take() {
            patch.files.push(done);
        }

        Ok(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SIMPLE_PATCH: &str = "\
diff --git a/file.txt b/file.txt
index abc1234..def5678 100644
--- a/file.txt
+++ b/file.txt
@@ -1,3 +1,3 @@
 one
-two
+TWO
 three
";

    #[test]
    fn test_parse_simple_modification() {
        let patch = Patch::parse(SIMPLE_PATCH).unwrap();

        assert_eq!(patch.files.len(), 1);
        let file = &patch.files[0];
        assert_eq!(file.old_path, PathBuf::from("file.txt"));
        assert_eq!(file.kind, FileChangeKind::Modify);
        assert_eq!(file.old_oid.as_deref(), Some("abc1234"));
        assert_eq!(file.hunks.len(), 1);

        let hunk = &file.hunks[0];
        assert_eq!((hunk.old_start, hunk.old_count), (1, 3));
        assert_eq!(hunk.lines.len(), 4);
        assert_eq!(hunk.lines[1].kind, PatchLineKind::Del);
        assert_eq!(hunk.lines[2].kind, PatchLineKind::Add);
        assert_eq!(hunk.lines[2].text, "TWO");
    }

    #[test]
    fn test_parse_render_round_trip() {
        let patch = Patch::parse(SIMPLE_PATCH).unwrap();
        let rendered = patch.render();
        let reparsed = Patch::parse(&rendered).unwrap();

        assert_eq!(reparsed.files[0].hunks, patch.files[0].hunks);
    }

    #[test]
    fn test_parse_new_file() {
        let text = "\
diff --git a/fresh.txt b/fresh.txt
new file mode 100644
index 0000000..9daeafb
--- /dev/null
+++ b/fresh.txt
@@ -0,0 +1 @@
+hello
";
        let patch = Patch::parse(text).unwrap();
        let file = &patch.files[0];

        assert_eq!(file.kind, FileChangeKind::Create);
        assert_eq!(file.hunks[0].old_count, 0);
        assert_eq!(file.hunks[0].lines[0].kind, PatchLineKind::Add);
    }

    #[test]
    fn test_parse_no_newline_marker() {
        let text = "\
diff --git a/file.txt b/file.txt
index abc1234..def5678 100644
--- a/file.txt
+++ b/file.txt
@@ -1 +1 @@
-line
+line
\\ No newline at end of file
";
        let patch = Patch::parse(text).unwrap();
        let lines = &patch.files[0].hunks[0].lines;

        assert!(!lines[0].no_newline);
        assert!(lines[1].no_newline);
    }

    #[test]
    fn test_reversed_swaps_everything() {
        let patch = Patch::parse(SIMPLE_PATCH).unwrap();
        let reversed = patch.reversed();
        let hunk = &reversed.files[0].hunks[0];

        assert_eq!(hunk.lines[1].kind, PatchLineKind::Add);
        assert_eq!(hunk.lines[1].text, "two");
        assert_eq!(hunk.lines[2].kind, PatchLineKind::Del);
        assert_eq!(reversed.files[0].old_oid.as_deref(), Some("def5678"));
    }

    #[test]
    fn test_double_reverse_is_identity() {
        let patch = Patch::parse(SIMPLE_PATCH).unwrap();
        assert_eq!(patch.reversed().reversed().render(), patch.render());
    }

    #[test]
    fn test_recombine_recomputes_ranges() {
        let text = "\
diff --git a/file.txt b/file.txt
index abc1234..def5678 100644
--- a/file.txt
+++ b/file.txt
@@ -1,2 +1,3 @@
 one
+added
 two
@@ -10,2 +11,2 @@
 ten
-eleven
+ELEVEN
";
        let patch = Patch::parse(text).unwrap();
        let file = &patch.files[0];

        // drop the first hunk; the second must shift back to the old line
        let survivors = vec![file.hunks[1].clone()];
        let recombined = file.recombine(survivors);

        assert_eq!(recombined.hunks.len(), 1);
        assert_eq!(recombined.hunks[0].old_start, 10);
        assert_eq!(recombined.hunks[0].new_start, 10);
    }

    #[test]
    fn test_parse_multiple_files() {
        let text = format!(
            "{}{}",
            SIMPLE_PATCH,
            "\
diff --git a/other.txt b/other.txt
index 1111111..2222222 100644
--- a/other.txt
+++ b/other.txt
@@ -1 +1 @@
-a
+b
"
        );
        let patch = Patch::parse(&text).unwrap();

        assert_eq!(patch.files.len(), 2);
        assert_eq!(patch.files[1].new_path, PathBuf::from("other.txt"));
    }
}
