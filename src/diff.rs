//! line-oriented Myers diff, hunk grouping and patch

use std::collections::{HashMap, VecDeque};

/// kind of a single edit operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditKind {
    Equal,
    Insert,
    Delete,
}

/// a single edit operation over one line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edit {
    pub kind: EditKind,
    pub text: String,
}

/// a contiguous group of edits with surrounding equal-context lines
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Hunk {
    /// first old line covered, zero-based
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub edits: Vec<Edit>,
}

/// a complete line-level difference between two texts
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diff {
    pub hunks: Vec<Hunk>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }
}

/// equal-context lines kept around each hunk
const CONTEXT: usize = 3;

/// compute the line diff between two texts
pub fn diff(old_text: &str, new_text: &str) -> Diff {
    let old_lines = split_lines(old_text);
    let new_lines = split_lines(new_text);

    let edits = myers(&old_lines, &new_lines);
    Diff {
        hunks: group_hunks(&edits, &old_lines, CONTEXT),
    }
}

/// Myers shortest-edit-script over two line sequences
pub fn myers(a: &[String], b: &[String]) -> Vec<Edit> {
    let n = a.len();
    let m = b.len();

    if n == 0 && m == 0 {
        return vec![];
    }
    if n == 0 {
        return b
            .iter()
            .map(|line| Edit { kind: EditKind::Insert, text: line.clone() })
            .collect();
    }
    if m == 0 {
        return a
            .iter()
            .map(|line| Edit { kind: EditKind::Delete, text: line.clone() })
            .collect();
    }

    let max = n + m;
    let offset = max as isize;

    // furthest-reaching x positions per diagonal k, plus a per-D snapshot
    // for backtracking
    let mut v = vec![0usize; 2 * max + 1];
    let mut trace: Vec<HashMap<isize, usize>> = Vec::new();

    for d in 0..=(max as isize) {
        let mut snapshot = HashMap::new();
        let mut k = -d;
        while k <= d {
            snapshot.insert(k, v[(k + offset) as usize]);
            k += 2;
        }
        trace.push(snapshot);

        let mut k = -d;
        while k <= d {
            let mut x = if k == -d
                || (k != d && v[(k - 1 + offset) as usize] < v[(k + 1 + offset) as usize])
            {
                v[(k + 1 + offset) as usize]
            } else {
                v[(k - 1 + offset) as usize] + 1
            };
            let mut y = (x as isize - k) as usize;

            // extend the diagonal as far as it matches
            while x < n && y < m && a[x] == b[y] {
                x += 1;
                y += 1;
            }

            v[(k + offset) as usize] = x;

            if x >= n && y >= m {
                return backtrack(a, b, &trace, d);
            }
            k += 2;
        }
    }

    vec![]
}

/// reconstruct the edit script from the per-D trace
fn backtrack(a: &[String], b: &[String], trace: &[HashMap<isize, usize>], mut d: isize) -> Vec<Edit> {
    let mut edits: VecDeque<Edit> = VecDeque::new();
    let mut x = a.len();
    let mut y = b.len();

    while d > 0 {
        let v = &trace[d as usize];
        let k = x as isize - y as isize;

        let prev_k = if k == -d
            || (k != d
                && v.get(&(k - 1)).copied().unwrap_or(0) < v.get(&(k + 1)).copied().unwrap_or(0))
        {
            k + 1
        } else {
            k - 1
        };

        let prev_x = v.get(&prev_k).copied().unwrap_or(0);
        let prev_y = (prev_x as isize - prev_k) as usize;

        // diagonal run (equal lines)
        while x > prev_x && y > prev_y {
            x -= 1;
            y -= 1;
            edits.push_front(Edit { kind: EditKind::Equal, text: a[x].clone() });
        }

        if x == prev_x {
            y -= 1;
            edits.push_front(Edit { kind: EditKind::Insert, text: b[y].clone() });
        } else {
            x -= 1;
            edits.push_front(Edit { kind: EditKind::Delete, text: a[x].clone() });
        }

        d -= 1;
    }

    // leading equal run
    while x > 0 && y > 0 {
        x -= 1;
        y -= 1;
        edits.push_front(Edit { kind: EditKind::Equal, text: a[x].clone() });
    }

    edits.into()
}

/// group edits into hunks with equal-context lines
///
/// hunks separated by 2·context or fewer equal lines merge into one.
fn group_hunks(edits: &[Edit], old_lines: &[String], context: usize) -> Vec<Hunk> {
    if edits.is_empty() {
        return vec![];
    }

    let mut hunks = Vec::new();
    let mut current: Option<Hunk> = None;
    let mut old_idx = 0usize;
    let mut new_idx = 0usize;
    let mut context_before = 0usize;
    let mut context_after = 0usize;

    for (i, edit) in edits.iter().enumerate() {
        match edit.kind {
            EditKind::Equal => {
                if current.is_none() {
                    context_before = (context_before + 1).min(context);
                } else {
                    context_after += 1;

                    // close the hunk when no change follows within the
                    // look-ahead window and we have enough context.
                    // window of context+1 makes hunks separated by
                    // 2*context or fewer equal lines merge
                    let more_changes = edits[i + 1..]
                        .iter()
                        .take(context + 1)
                        .any(|e| e.kind != EditKind::Equal);

                    if !more_changes && context_after >= context {
                        if let Some(done) = current.take() {
                            hunks.push(done);
                        }
                        context_before = 0;
                        context_after = 0;
                    } else if let Some(hunk) = current.as_mut() {
                        hunk.edits.push(edit.clone());
                        hunk.old_count += 1;
                        hunk.new_count += 1;
                    }
                }
                old_idx += 1;
                new_idx += 1;
            }

            EditKind::Delete | EditKind::Insert => {
                if current.is_none() {
                    let mut hunk = Hunk {
                        old_start: old_idx - context_before,
                        new_start: new_idx - context_before,
                        ..Default::default()
                    };
                    for j in (1..=context_before).rev() {
                        if old_idx >= j {
                            hunk.edits.push(Edit {
                                kind: EditKind::Equal,
                                text: old_lines[old_idx - j].clone(),
                            });
                            hunk.old_count += 1;
                            hunk.new_count += 1;
                        }
                    }
                    current = Some(hunk);
                }

                if let Some(hunk) = current.as_mut() {
                    hunk.edits.push(edit.clone());
                    context_after = 0;

                    if edit.kind == EditKind::Delete {
                        hunk.old_count += 1;
                        old_idx += 1;
                    } else {
                        hunk.new_count += 1;
                        new_idx += 1;
                    }
                }
            }
        }
    }

    if let Some(hunk) = current {
        hunks.push(hunk);
    }

    hunks
}

/// apply a diff to a text
///
/// one pass over the original lines: copy up to each hunk's `old_start`,
/// emit its non-deleted edits, resume after `old_start + old_count`.
pub fn patch(text: &str, diff: &Diff) -> String {
    let lines = split_lines(text);
    let mut out: Vec<&str> = Vec::new();
    let mut cursor = 0usize;

    for hunk in &diff.hunks {
        let start = hunk.old_start.min(lines.len());
        for line in &lines[cursor.min(start)..start] {
            out.push(line);
        }
        for edit in &hunk.edits {
            match edit.kind {
                EditKind::Equal | EditKind::Insert => out.push(&edit.text),
                EditKind::Delete => {}
            }
        }
        cursor = (hunk.old_start + hunk.old_count).min(lines.len());
    }

    for line in &lines[cursor.min(lines.len())..] {
        out.push(line);
    }

    let mut result = out.join("\n");
    // keep the input's trailing-newline convention
    if !result.is_empty() && (text.ends_with('\n') || text.is_empty()) {
        result.push('\n');
    }
    result
}

/// split on `\n`, discarding the empty segment after a terminal newline
pub(crate) fn split_lines(text: &str) -> Vec<String> {
    if text.is_empty() {
        return vec![];
    }
    let mut lines: Vec<String> = text.split('\n').map(String::from).collect();
    if lines.last().map(String::as_str) == Some("") {
        lines.pop();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_empty_texts() {
        assert!(diff("", "").is_empty());
    }

    #[test]
    fn test_diff_identical_texts() {
        let text = "line1\nline2\nline3\n";
        assert!(diff(text, text).is_empty());
    }

    #[test]
    fn test_diff_simple_addition() {
        let d = diff("line1\nline2\n", "line1\nline2\nline3\n");
        assert_eq!(d.hunks.len(), 1);
        let hunk = &d.hunks[0];
        assert_eq!(hunk.new_count, hunk.old_count + 1);
    }

    #[test]
    fn test_diff_simple_deletion() {
        let d = diff("line1\nline2\nline3\n", "line1\nline3\n");
        assert_eq!(d.hunks.len(), 1);
        let hunk = &d.hunks[0];
        assert_eq!(hunk.old_count, hunk.new_count + 1);
    }

    #[test]
    fn test_diff_nearby_changes_merge_into_one_hunk() {
        let old = "a\nb\nc\nd\ne\nf\n";
        let new = "a\nB\nc\nd\nE\nf\n";

        // two changed lines separated by 2 equal lines, within 2*context
        let d = diff(old, new);
        assert_eq!(d.hunks.len(), 1);
    }

    #[test]
    fn test_hunk_merge_boundary() {
        // gap of exactly 2*context equal lines: one hunk
        let old: String = (0..16).map(|i| format!("line{}\n", i)).collect();
        let mut changed: Vec<String> = (0..16).map(|i| format!("line{}", i)).collect();
        changed[4] = "first change".to_string();
        changed[11] = "second change".to_string(); // 6 equal lines between
        let new = changed.join("\n") + "\n";
        assert_eq!(diff(&old, &new).hunks.len(), 1);

        // gap of 2*context + 1: two hunks
        let mut changed: Vec<String> = (0..16).map(|i| format!("line{}", i)).collect();
        changed[4] = "first change".to_string();
        changed[12] = "second change".to_string(); // 7 equal lines between
        let new = changed.join("\n") + "\n";
        assert_eq!(diff(&old, &new).hunks.len(), 2);
    }

    #[test]
    fn test_diff_distant_changes_make_two_hunks() {
        let old_lines: Vec<String> = (0..20).map(|i| format!("line{}", i)).collect();
        let mut new_lines = old_lines.clone();
        new_lines[1] = "changed near top".to_string();
        new_lines[18] = "changed near bottom".to_string();

        let old = old_lines.join("\n") + "\n";
        let new = new_lines.join("\n") + "\n";

        let d = diff(&old, &new);
        assert_eq!(d.hunks.len(), 2);
    }

    #[test]
    fn test_patch_modification() {
        let old = "line1\nline2\nline3\n";
        let new = "line1\nmodified\nline3\n";

        assert_eq!(patch(old, &diff(old, new)), new);
    }

    #[test]
    fn test_patch_addition() {
        let old = "line1\nline2\n";
        let new = "line1\nline2\nline3\n";

        assert_eq!(patch(old, &diff(old, new)), new);
    }

    #[test]
    fn test_patch_deletion() {
        let old = "line1\nline2\nline3\n";
        let new = "line1\nline3\n";

        assert_eq!(patch(old, &diff(old, new)), new);
    }

    #[test]
    fn test_patch_from_empty() {
        let old = "";
        let new = "a\nb\n";

        assert_eq!(patch(old, &diff(old, new)), new);
    }

    #[test]
    fn test_patch_to_empty() {
        let old = "a\nb\n";
        let new = "";

        assert_eq!(patch(old, &diff(old, new)), new);
    }

    #[test]
    fn test_patch_multiple_hunks_with_shifted_offsets() {
        // the first hunk inserts lines, shifting everything after it;
        // the second hunk must still land correctly
        let old: String = (0..20).map(|i| format!("line{}\n", i)).collect();
        let mut new_lines: Vec<String> = (0..20).map(|i| format!("line{}", i)).collect();
        new_lines.insert(2, "inserted a".to_string());
        new_lines.insert(3, "inserted b".to_string());
        new_lines[19] = "rewritten".to_string();
        let new = new_lines.join("\n") + "\n";

        assert_eq!(patch(&old, &diff(&old, &new)), new);
    }

    #[test]
    fn test_patch_total_rewrite() {
        let old = "alpha\nbeta\n";
        let new = "gamma\ndelta\nepsilon\n";

        assert_eq!(patch(old, &diff(old, new)), new);
    }

    #[test]
    fn test_split_lines() {
        assert!(split_lines("").is_empty());
        assert_eq!(split_lines("one line"), vec!["one line"]);
        assert_eq!(split_lines("a\nb\nc"), vec!["a", "b", "c"]);
        // trailing newline does not create a phantom line
        assert_eq!(split_lines("a\nb\n"), vec!["a", "b"]);
    }

    #[test]
    fn test_myers_minimal_script() {
        let a: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let b: Vec<String> = ["a", "x", "c"].iter().map(|s| s.to_string()).collect();

        let edits = myers(&a, &b);
        let deletes = edits.iter().filter(|e| e.kind == EditKind::Delete).count();
        let inserts = edits.iter().filter(|e| e.kind == EditKind::Insert).count();
        assert_eq!(deletes, 1);
        assert_eq!(inserts, 1);
    }
}
