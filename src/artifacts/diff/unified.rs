//! Unified diff output
//!
//! Renders a pair of diff targets as unified-diff text: the `diff --git`
//! header, mode lines, the `index` line, and context hunks. The same
//! rendering feeds the `diff` command (with color) and patch generation for
//! the apply path (plain).

use crate::artifacts::diff::diff_algorithm::{Edit, EditKind, Hunk, MyersDiff};
use crate::artifacts::diff::diff_target::DiffTarget;
use colored::Colorize;
use std::io::Write;

/// Marker emitted after a final line that lacks its terminator
pub const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

/// Default number of context lines around a change
pub const DEFAULT_CONTEXT: usize = 3;

/// Rendering behavior
#[derive(Debug, Clone, Copy)]
pub struct PatchFormat {
    pub context: usize,
    pub color: bool,
}

impl Default for PatchFormat {
    fn default() -> Self {
        PatchFormat {
            context: DEFAULT_CONTEXT,
            color: false,
        }
    }
}

impl PatchFormat {
    fn meta(&self, text: String) -> String {
        if self.color {
            text.bold().to_string()
        } else {
            text
        }
    }

    fn hunk_header(&self, text: String) -> String {
        if self.color {
            text.cyan().to_string()
        } else {
            text
        }
    }
}

/// Write one file's unified diff; a no-op for identical targets
pub fn write_patch(
    writer: &mut dyn Write,
    a: &DiffTarget,
    b: &DiffTarget,
    format: &PatchFormat,
) -> anyhow::Result<()> {
    if a.oid == b.oid && a.mode == b.mode {
        return Ok(());
    }

    writeln!(
        writer,
        "{}",
        format.meta(format!(
            "diff --git {} {}",
            // headers always carry both labels, even for adds and deletes
            format!("a/{}", a.path.display()),
            format!("b/{}", b.path.display())
        ))
    )?;

    write_mode_lines(writer, a, b, format)?;
    write_content(writer, a, b, format)?;

    Ok(())
}

fn write_mode_lines(
    writer: &mut dyn Write,
    a: &DiffTarget,
    b: &DiffTarget,
    format: &PatchFormat,
) -> anyhow::Result<()> {
    if a.mode.is_none() {
        writeln!(
            writer,
            "{}",
            format.meta(format!("new file mode {}", b.pretty_mode()))
        )?;
    } else if b.mode.is_none() {
        writeln!(
            writer,
            "{}",
            format.meta(format!("deleted file mode {}", a.pretty_mode()))
        )?;
    } else if a.mode != b.mode {
        writeln!(writer, "{}", format.meta(format!("old mode {}", a.pretty_mode())))?;
        writeln!(writer, "{}", format.meta(format!("new mode {}", b.pretty_mode())))?;
    }

    Ok(())
}

fn write_content(
    writer: &mut dyn Write,
    a: &DiffTarget,
    b: &DiffTarget,
    format: &PatchFormat,
) -> anyhow::Result<()> {
    if a.oid == b.oid {
        return Ok(());
    }

    let mut index_line = format!("index {}..{}", a.oid.to_short_oid(), b.oid.to_short_oid());
    if a.mode == b.mode {
        index_line.push_str(&format!(" {}", a.pretty_mode()));
    }
    writeln!(writer, "{}", format.meta(index_line))?;

    if a.is_binary() || b.is_binary() {
        writeln!(
            writer,
            "Binary files {} and {} differ",
            a.diff_path("a"),
            b.diff_path("b")
        )?;
        return Ok(());
    }

    writeln!(writer, "{}", format.meta(format!("--- {}", a.diff_path("a"))))?;
    writeln!(writer, "{}", format.meta(format!("+++ {}", b.diff_path("b"))))?;

    let a_lines = a.lines();
    let b_lines = b.lines();
    let mut edits = MyersDiff::new(&a_lines, &b_lines).diff();
    split_trailing_newline_change(&mut edits, a, b);

    for hunk in Hunk::filter(&edits, format.context) {
        write_hunk(writer, &hunk, a, b, format)?;
    }

    Ok(())
}

/// A terminator-only change on the final line diffs as equal text; surface
/// it as an explicit delete/insert pair the way the patch format expects
fn split_trailing_newline_change(edits: &mut Vec<Edit>, a: &DiffTarget, b: &DiffTarget) {
    if a.ends_with_newline() == b.ends_with_newline() {
        return;
    }

    let Some(last) = edits.last() else {
        return;
    };
    if last.kind != EditKind::Eql {
        return;
    }

    let last = edits.pop().expect("just observed");
    edits.push(Edit {
        kind: EditKind::Del,
        a_line: last.a_line,
        b_line: None,
    });
    edits.push(Edit {
        kind: EditKind::Ins,
        a_line: None,
        b_line: last.b_line,
    });
}

fn write_hunk(
    writer: &mut dyn Write,
    hunk: &Hunk,
    a: &DiffTarget,
    b: &DiffTarget,
    format: &PatchFormat,
) -> anyhow::Result<()> {
    writeln!(writer, "{}", format.hunk_header(hunk.header()))?;

    let a_len = a.lines().len();
    let b_len = b.lines().len();

    for edit in hunk.edits() {
        writeln!(writer, "{}", edit)?;

        let after_last_a = edit
            .a_line
            .as_ref()
            .is_some_and(|line| line.number == a_len)
            && !a.ends_with_newline();
        let after_last_b = edit
            .b_line
            .as_ref()
            .is_some_and(|line| line.number == b_len)
            && !b.ends_with_newline();

        if (edit.kind != EditKind::Ins && after_last_a)
            || (edit.kind == EditKind::Ins && after_last_b)
        {
            writeln!(writer, "{}", NO_NEWLINE_MARKER)?;
        }
    }

    Ok(())
}
