//! Myers' diff algorithm
//!
//! Computes a shortest edit script between two line sequences and groups the
//! resulting edits into context-bounded hunks for unified output.

use std::fmt;

/// A line with its 1-based number in its source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub number: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    /// Line present on both sides
    Eql,
    /// Line inserted on the right side
    Ins,
    /// Line deleted from the left side
    Del,
}

/// One edit of the script; equal edits carry both lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub kind: EditKind,
    pub a_line: Option<Line>,
    pub b_line: Option<Line>,
}

impl fmt::Display for Edit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (sign, line) = match self.kind {
            EditKind::Eql => (' ', self.a_line.as_ref()),
            EditKind::Del => ('-', self.a_line.as_ref()),
            EditKind::Ins => ('+', self.b_line.as_ref()),
        };

        write!(f, "{}{}", sign, line.map(|l| l.text.as_str()).unwrap_or(""))
    }
}

/// Myers' O((N+M)D) diff over two line sequences
#[derive(Debug)]
pub struct MyersDiff {
    a: Vec<Line>,
    b: Vec<Line>,
}

impl MyersDiff {
    pub fn new(a: &[String], b: &[String]) -> Self {
        let number = |lines: &[String]| {
            lines
                .iter()
                .enumerate()
                .map(|(index, text)| Line {
                    number: index + 1,
                    text: text.clone(),
                })
                .collect()
        };

        MyersDiff {
            a: number(a),
            b: number(b),
        }
    }

    /// Compute the full edit script
    pub fn diff(&self) -> Vec<Edit> {
        let mut edits = Vec::new();

        for (prev_x, prev_y, x, y) in self.backtrack() {
            if x == prev_x {
                edits.push(Edit {
                    kind: EditKind::Ins,
                    a_line: None,
                    b_line: Some(self.b[prev_y].clone()),
                });
            } else if y == prev_y {
                edits.push(Edit {
                    kind: EditKind::Del,
                    a_line: Some(self.a[prev_x].clone()),
                    b_line: None,
                });
            } else {
                edits.push(Edit {
                    kind: EditKind::Eql,
                    a_line: Some(self.a[prev_x].clone()),
                    b_line: Some(self.b[prev_y].clone()),
                });
            }
        }

        edits.reverse();
        edits
    }

    /// Group the edit script into hunks with the given context line count
    pub fn flatten_diff(&self, context: usize) -> Vec<Hunk> {
        Hunk::filter(&self.diff(), context)
    }

    /// Shortest-edit-script trace, walked backwards
    fn backtrack(&self) -> Vec<(usize, usize, usize, usize)> {
        let n = self.a.len() as isize;
        let m = self.b.len() as isize;
        let max = n + m;

        if max == 0 {
            return Vec::new();
        }

        // forward pass: record the furthest-reaching x per diagonal per depth
        let width = (2 * max + 1) as usize;
        let index = |k: isize| (k + max) as usize;

        let mut v = vec![0isize; width];
        let mut trace: Vec<Vec<isize>> = Vec::new();
        let mut found_depth = None;

        'outer: for d in 0..=max {
            trace.push(v.clone());

            let mut k = -d;
            while k <= d {
                let mut x = if k == -d || (k != d && v[index(k - 1)] < v[index(k + 1)]) {
                    v[index(k + 1)]
                } else {
                    v[index(k - 1)] + 1
                };
                let mut y = x - k;

                while x < n && y < m && self.a[x as usize].text == self.b[y as usize].text {
                    x += 1;
                    y += 1;
                }

                v[index(k)] = x;

                if x >= n && y >= m {
                    found_depth = Some(d);
                    break 'outer;
                }

                k += 2;
            }
        }

        // backward pass: recover the path as (prev_x, prev_y, x, y) steps
        let mut moves = Vec::new();
        let (mut x, mut y) = (n, m);

        let depth = found_depth.unwrap_or(max);
        for d in (0..=depth).rev() {
            let v = &trace[d as usize];
            let k = x - y;

            let prev_k = if k == -d || (k != d && v[index(k - 1)] < v[index(k + 1)]) {
                k + 1
            } else {
                k - 1
            };
            let prev_x = v[index(prev_k)];
            let prev_y = prev_x - prev_k;

            while x > prev_x && y > prev_y {
                moves.push(((x - 1) as usize, (y - 1) as usize, x as usize, y as usize));
                x -= 1;
                y -= 1;
            }

            if d > 0 {
                moves.push((prev_x as usize, prev_y as usize, x as usize, y as usize));
            }

            x = prev_x;
            y = prev_y;
        }

        moves
    }
}

/// A run of edits bounded by context lines
#[derive(Debug, Clone)]
pub struct Hunk {
    a_start: usize,
    b_start: usize,
    edits: Vec<Edit>,
}

impl Hunk {
    /// Group an edit script into hunks
    ///
    /// Changes closer than `2 * context` lines share one hunk; each hunk is
    /// padded with up to `context` equal lines on both ends.
    pub fn filter(edits: &[Edit], context: usize) -> Vec<Hunk> {
        let change_positions: Vec<usize> = edits
            .iter()
            .enumerate()
            .filter(|(_, edit)| edit.kind != EditKind::Eql)
            .map(|(position, _)| position)
            .collect();

        if change_positions.is_empty() {
            return Vec::new();
        }

        // split change positions into groups no further than 2*context apart
        let mut groups: Vec<(usize, usize)> = Vec::new();
        let mut start = change_positions[0];
        let mut last = change_positions[0];
        for &position in &change_positions[1..] {
            if position - last > 2 * context {
                groups.push((start, last));
                start = position;
            }
            last = position;
        }
        groups.push((start, last));

        groups
            .into_iter()
            .map(|(first, last)| {
                let lo = first.saturating_sub(context);
                let hi = (last + context + 1).min(edits.len());
                Self::build(&edits[lo..hi])
            })
            .collect()
    }

    fn build(edits: &[Edit]) -> Hunk {
        let a_start = edits
            .iter()
            .find_map(|edit| edit.a_line.as_ref())
            .map(|line| line.number)
            .unwrap_or_else(|| {
                // pure insertion: anchor after the preceding a line
                edits
                    .iter()
                    .find_map(|edit| edit.b_line.as_ref())
                    .map(|line| line.number.saturating_sub(1))
                    .unwrap_or(0)
            });
        let b_start = edits
            .iter()
            .find_map(|edit| edit.b_line.as_ref())
            .map(|line| line.number)
            .unwrap_or_else(|| {
                edits
                    .iter()
                    .find_map(|edit| edit.a_line.as_ref())
                    .map(|line| line.number.saturating_sub(1))
                    .unwrap_or(0)
            });

        Hunk {
            a_start,
            b_start,
            edits: edits.to_vec(),
        }
    }

    pub fn a_start(&self) -> usize {
        self.a_start
    }

    pub fn b_start(&self) -> usize {
        self.b_start
    }

    pub fn a_size(&self) -> usize {
        self.edits
            .iter()
            .filter(|edit| edit.a_line.is_some())
            .count()
    }

    pub fn b_size(&self) -> usize {
        self.edits
            .iter()
            .filter(|edit| edit.b_line.is_some())
            .count()
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    /// Canonical `@@ -a,b +c,d @@` header, omitting single-line counts
    pub fn header(&self) -> String {
        format!(
            "@@ -{} +{} @@",
            Self::format_range(self.a_start, self.a_size()),
            Self::format_range(self.b_start, self.b_size())
        )
    }

    fn format_range(start: usize, size: usize) -> String {
        if size == 1 {
            format!("{}", start)
        } else {
            format!("{},{}", start, size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lines(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|text| text.to_string()).collect()
    }

    fn render(edits: &[Edit]) -> Vec<String> {
        edits.iter().map(|edit| edit.to_string()).collect()
    }

    #[test]
    fn test_identical_inputs_produce_only_equal_edits() {
        let a = lines(&["one", "two"]);
        let diff = MyersDiff::new(&a, &a).diff();

        assert!(diff.iter().all(|edit| edit.kind == EditKind::Eql));
        assert_eq!(diff.len(), 2);
    }

    #[test]
    fn test_single_line_change() {
        let a = lines(&["one", "two", "three"]);
        let b = lines(&["one", "2", "three"]);

        let diff = MyersDiff::new(&a, &b).diff();
        assert_eq!(render(&diff), vec![" one", "-two", "+2", " three"]);
    }

    #[test]
    fn test_insertion_into_empty() {
        let diff = MyersDiff::new(&[], &lines(&["new"])).diff();
        assert_eq!(render(&diff), vec!["+new"]);
    }

    #[test]
    fn test_deletion_to_empty() {
        let diff = MyersDiff::new(&lines(&["gone"]), &[]).diff();
        assert_eq!(render(&diff), vec!["-gone"]);
    }

    #[test]
    fn test_classic_abcabba_trace() {
        let a = lines(&["A", "B", "C", "A", "B", "B", "A"]);
        let b = lines(&["C", "B", "A", "B", "A", "C"]);

        let diff = MyersDiff::new(&a, &b).diff();

        // a shortest script has length 5 for this classic pair
        let changes = diff.iter().filter(|e| e.kind != EditKind::Eql).count();
        assert_eq!(changes, 5);

        // applying the script to `a` must reproduce `b`
        let mut rebuilt = Vec::new();
        for edit in &diff {
            match edit.kind {
                EditKind::Eql | EditKind::Ins => {
                    rebuilt.push(edit.b_line.as_ref().unwrap().text.clone())
                }
                EditKind::Del => {}
            }
        }
        assert_eq!(rebuilt, b);
    }

    #[test]
    fn test_hunk_groups_nearby_changes() {
        let a = lines(&["1", "2", "3", "4", "5", "6", "7", "8"]);
        let b = lines(&["1", "x", "3", "4", "5", "6", "y", "8"]);

        // default context of 3 merges both changes into one hunk
        let hunks = MyersDiff::new(&a, &b).flatten_diff(3);
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].header(), "@@ -1,8 +1,8 @@");
    }

    #[test]
    fn test_hunks_split_when_far_apart() {
        let mut a_texts = vec!["start".to_string()];
        a_texts.extend((0..20).map(|i| format!("mid{}", i)));
        a_texts.push("end".to_string());

        let mut b_texts = vec!["START".to_string()];
        b_texts.extend((0..20).map(|i| format!("mid{}", i)));
        b_texts.push("END".to_string());

        let hunks = MyersDiff::new(&a_texts, &b_texts).flatten_diff(3);
        assert_eq!(hunks.len(), 2);
    }

    #[test]
    fn test_header_omits_single_line_counts() {
        let a = lines(&["only"]);
        let b = lines(&["changed"]);

        let hunks = MyersDiff::new(&a, &b).flatten_diff(3);
        assert_eq!(hunks[0].header(), "@@ -1 +1 @@");
    }

    #[test]
    fn test_pure_insertion_hunk_anchors_before_first_line() {
        let hunks = MyersDiff::new(&[], &lines(&["a", "b"])).flatten_diff(3);
        assert_eq!(hunks[0].header(), "@@ -0,0 +1,2 @@");
    }
}
