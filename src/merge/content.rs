//! three-way content merge over blob bytes
//!
//! both sides are diffed against the base with the Myers differ, then
//! reconciled one base line at a time. conflicting regions are rendered
//! with the canonical seven-character markers, `HEAD` labeling our side,
//! `BASE` the ancestor and the incoming branch name labeling theirs.

use std::collections::HashMap;

use super::state::ConflictKind;
use crate::diff::{self, EditKind};

/// one conflicted region of a content merge
#[derive(Clone, Debug)]
pub struct LineConflict {
    pub path: String,
    pub kind: ConflictKind,
    pub base: String,
    pub ours: String,
    pub theirs: String,
    /// base line index the conflict anchors to
    pub line: usize,
}

/// result of merging one file's contents
#[derive(Clone, Debug)]
pub struct ContentMerge {
    pub content: String,
    pub conflicts: Vec<LineConflict>,
    pub has_conflict: bool,
}

impl ContentMerge {
    fn clean(content: String) -> Self {
        Self {
            content,
            conflicts: vec![],
            has_conflict: false,
        }
    }
}

/// merge three versions of a file
pub fn three_way(
    base: &[u8],
    ours: &[u8],
    theirs: &[u8],
    path: &str,
    their_label: &str,
) -> ContentMerge {
    if is_binary(base) || is_binary(ours) || is_binary(theirs) {
        if ours != theirs {
            return ContentMerge {
                content: binary_conflict_markers(path, their_label),
                conflicts: vec![LineConflict {
                    path: path.to_string(),
                    kind: ConflictKind::Binary,
                    base: String::from_utf8_lossy(base).into_owned(),
                    ours: String::from_utf8_lossy(ours).into_owned(),
                    theirs: String::from_utf8_lossy(theirs).into_owned(),
                    line: 0,
                }],
                has_conflict: true,
            };
        }
        return ContentMerge::clean(String::from_utf8_lossy(ours).into_owned());
    }

    let base = String::from_utf8_lossy(base);
    let ours = String::from_utf8_lossy(ours);
    let theirs = String::from_utf8_lossy(theirs);

    // trivial resolutions before running the differ
    if ours == theirs {
        return ContentMerge::clean(ours.into_owned());
    }
    if ours == base {
        return ContentMerge::clean(theirs.into_owned());
    }
    if theirs == base {
        return ContentMerge::clean(ours.into_owned());
    }

    merge_content(&base, &ours, &theirs, path, their_label)
}

/// an edit touching a specific base line
#[derive(Clone, Debug, PartialEq, Eq)]
struct ChangeInfo {
    kind: EditKind,
    text: String,
}

fn merge_content(
    base: &str,
    ours: &str,
    theirs: &str,
    path: &str,
    their_label: &str,
) -> ContentMerge {
    let our_changes = build_change_map(&diff::diff(base, ours));
    let their_changes = build_change_map(&diff::diff(base, theirs));

    let base_lines = split_lines(base);

    let (merged, conflicts) = merge_lines(
        &base_lines,
        &our_changes,
        &their_changes,
        path,
    );

    if conflicts.is_empty() {
        let mut content = merged.join("\n");
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        return ContentMerge::clean(content);
    }

    let content = render_markers(&merged, &conflicts, their_label);
    ContentMerge {
        content,
        conflicts,
        has_conflict: true,
    }
}

/// index every edit by the base line it touches
///
/// inserts do not advance the base index; an insert after the last line
/// lands on the one-past-the-end slot.
fn build_change_map(d: &diff::Diff) -> HashMap<usize, Vec<ChangeInfo>> {
    let mut changes: HashMap<usize, Vec<ChangeInfo>> = HashMap::new();

    for hunk in &d.hunks {
        let mut base_idx = hunk.old_start;
        for edit in &hunk.edits {
            match edit.kind {
                EditKind::Delete | EditKind::Equal => {
                    changes.entry(base_idx).or_default().push(ChangeInfo {
                        kind: edit.kind,
                        text: edit.text.clone(),
                    });
                    base_idx += 1;
                }
                EditKind::Insert => {
                    changes.entry(base_idx).or_default().push(ChangeInfo {
                        kind: edit.kind,
                        text: edit.text.clone(),
                    });
                }
            }
        }
    }

    changes
}

const NO_EDITS: &[ChangeInfo] = &[];

/// walk base lines (plus the end slot) and reconcile both edit streams
fn merge_lines(
    base: &[String],
    our_changes: &HashMap<usize, Vec<ChangeInfo>>,
    their_changes: &HashMap<usize, Vec<ChangeInfo>>,
    path: &str,
) -> (Vec<String>, Vec<LineConflict>) {
    let mut merged = Vec::new();
    let mut conflicts = Vec::new();

    for i in 0..=base.len() {
        let our_edits = our_changes.get(&i).map(Vec::as_slice).unwrap_or(NO_EDITS);
        let their_edits = their_changes.get(&i).map(Vec::as_slice).unwrap_or(NO_EDITS);
        let base_line = base.get(i);

        // untouched on both sides: keep the base line
        if our_edits.is_empty() && their_edits.is_empty() {
            if let Some(line) = base_line {
                merged.push(line.clone());
            }
            continue;
        }

        // exactly one side touches this line: apply its edits
        if our_edits.is_empty() || their_edits.is_empty() {
            let edits = if our_edits.is_empty() { their_edits } else { our_edits };
            apply_edits(edits, base_line, &mut merged);
            continue;
        }

        // both touch it identically: apply once
        if our_edits == their_edits {
            for edit in our_edits {
                if edit.kind != EditKind::Delete {
                    merged.push(edit.text.clone());
                }
            }
            continue;
        }

        // both touch it differently
        conflicts.push(LineConflict {
            path: path.to_string(),
            kind: ConflictKind::Content,
            base: base_line.cloned().unwrap_or_default(),
            ours: format_edits(our_edits),
            theirs: format_edits(their_edits),
            line: i,
        });
        merged.push(format!("<<<CONFLICT_{}>>>", conflicts.len() - 1));
    }

    (merged, conflicts)
}

fn apply_edits(edits: &[ChangeInfo], base_line: Option<&String>, merged: &mut Vec<String>) {
    for edit in edits {
        match edit.kind {
            EditKind::Insert => merged.push(edit.text.clone()),
            EditKind::Equal => {
                if let Some(line) = base_line {
                    merged.push(line.clone());
                }
            }
            EditKind::Delete => {}
        }
    }
}

/// the non-deleted side of an edit list, one line per edit
fn format_edits(edits: &[ChangeInfo]) -> String {
    let lines: Vec<&str> = edits
        .iter()
        .filter(|e| e.kind != EditKind::Delete)
        .map(|e| e.text.as_str())
        .collect();
    lines.join("\n")
}

/// replace conflict placeholders with marker blocks
fn render_markers(merged: &[String], conflicts: &[LineConflict], their_label: &str) -> String {
    let mut out = String::new();

    for line in merged {
        let idx = line
            .strip_prefix("<<<CONFLICT_")
            .and_then(|rest| rest.strip_suffix(">>>"))
            .and_then(|n| n.parse::<usize>().ok());

        match idx.and_then(|i| conflicts.get(i)) {
            Some(c) => out.push_str(&conflict_block(&c.ours, &c.base, &c.theirs, their_label)),
            None => {
                out.push_str(line);
                out.push('\n');
            }
        }
    }

    out
}

/// a single conflict-marker block; markers sit at column zero
pub fn conflict_block(ours: &str, base: &str, theirs: &str, their_label: &str) -> String {
    let mut out = String::new();
    out.push_str("<<<<<<< HEAD\n");
    push_block(&mut out, ours);
    out.push_str("||||||| BASE\n");
    push_block(&mut out, base);
    out.push_str("=======\n");
    push_block(&mut out, theirs);
    out.push_str(&format!(">>>>>>> {}\n", their_label));
    out
}

fn push_block(out: &mut String, block: &str) {
    if block.is_empty() {
        return;
    }
    out.push_str(block);
    if !block.ends_with('\n') {
        out.push('\n');
    }
}

fn binary_conflict_markers(path: &str, their_label: &str) -> String {
    format!(
        "<<<<<<< HEAD\nBinary file {path} (ours)\n=======\nBinary file {path} (theirs)\n>>>>>>> {their_label}\n\nCannot auto-merge binary files.\nUse 'asl resolve --ours {path}' or 'asl resolve --theirs {path}'\n"
    )
}

/// binary detection: any NUL byte, or more than 30% non-text bytes in
/// the first 8 KiB
pub fn is_binary(content: &[u8]) -> bool {
    if content.contains(&0) {
        return true;
    }

    let sample = &content[..content.len().min(8192)];
    if sample.is_empty() {
        return false;
    }

    let non_text = sample
        .iter()
        .filter(|&&b| b < 7 || b == 11 || (14..32).contains(&b) && b != 27)
        .count();

    non_text > sample.len() * 30 / 100
}

fn split_lines(text: &str) -> Vec<String> {
    if text.is_empty() {
        return vec![];
    }
    let mut lines: Vec<String> = text.split('\n').map(String::from).collect();
    if lines.last().map(String::as_str) == Some("") {
        lines.pop();
    }
    lines
}
