//! Line-level merging of two divergent snippet versions.
//!
//! The remote store keeps only current content, so there is no common
//! ancestor to merge against. The two versions are aligned on a minimal
//! line diff; between two aligned anchors, lines present
//! on one side only are kept, and runs that differ on both sides are
//! conflicts. The result is deterministic: merging the same pair always
//! yields the same text.

use crate::item::PathSnippet;
use similar::{capture_diff_slices, Algorithm, DiffOp};

const MARKER_LOCAL: &str = "<<<<<<<";
const MARKER_SEPARATOR: &str = "=======";
const MARKER_REMOTE: &str = ">>>>>>>";

/// An overlap the merge could not settle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeConflict {
    /// Both sides replaced the same run of lines differently.
    Lines {
        /// Line index in the merged output where the run starts.
        start: usize,
        /// Local lines.
        local: Vec<String>,
        /// Remote lines.
        remote: Vec<String>,
    },
    /// The language field differs.
    Language {
        /// Local language.
        local: String,
        /// Remote language.
        remote: String,
    },
}

/// Result of [`merge_snippets`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Both sides combined cleanly.
    Merged(PathSnippet),
    /// A user decision is needed.
    Conflicted(Vec<MergeConflict>),
}

impl MergeOutcome {
    /// Returns true for a clean merge.
    pub fn is_merged(&self) -> bool {
        matches!(self, MergeOutcome::Merged(_))
    }
}

enum Hunk<'a> {
    Common(&'a str),
    Diverged {
        local: Vec<&'a str>,
        remote: Vec<&'a str>,
    },
}

/// Aligns two line sequences on a minimal line diff. Adjacent deletions
/// and insertions collapse into one diverged hunk.
fn align<'a>(local: &[&'a str], remote: &[&'a str]) -> Vec<Hunk<'a>> {
    let mut hunks: Vec<Hunk<'a>> = Vec::new();
    for op in capture_diff_slices(Algorithm::Myers, local, remote) {
        if let DiffOp::Equal { old_index, len, .. } = op {
            hunks.extend(local[old_index..old_index + len].iter().copied().map(Hunk::Common));
            continue;
        }
        let (_, old, new) = op.as_tag_tuple();
        match hunks.last_mut() {
            Some(Hunk::Diverged { local: l, remote: r }) => {
                l.extend_from_slice(&local[old]);
                r.extend_from_slice(&remote[new]);
            }
            _ => hunks.push(Hunk::Diverged {
                local: local[old].to_vec(),
                remote: remote[new].to_vec(),
            }),
        }
    }
    hunks
}

fn owned(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|l| l.to_string()).collect()
}

/// Attempts to merge two versions of the same snippet.
///
/// Lines added on one side only are combined; where both sides changed the
/// same run the outcome is [`MergeOutcome::Conflicted`]. Fields other than
/// code and language are taken from `local`.
pub fn merge_snippets(local: &PathSnippet, remote: &PathSnippet) -> MergeOutcome {
    let mut conflicts = Vec::new();
    if local.language != remote.language {
        conflicts.push(MergeConflict::Language {
            local: local.language.clone(),
            remote: remote.language.clone(),
        });
    }

    let local_lines: Vec<&str> = local.code.split('\n').collect();
    let remote_lines: Vec<&str> = remote.code.split('\n').collect();
    let mut merged: Vec<&str> = Vec::new();

    for hunk in align(&local_lines, &remote_lines) {
        match hunk {
            Hunk::Common(line) => merged.push(line),
            Hunk::Diverged { local, remote } if remote.is_empty() => merged.extend(local),
            Hunk::Diverged { local, remote } if local.is_empty() => merged.extend(remote),
            Hunk::Diverged { local, remote } => conflicts.push(MergeConflict::Lines {
                start: merged.len(),
                local: owned(&local),
                remote: owned(&remote),
            }),
        }
    }

    if conflicts.is_empty() {
        MergeOutcome::Merged(PathSnippet {
            code: merged.join("\n"),
            ..local.clone()
        })
    } else {
        MergeOutcome::Conflicted(conflicts)
    }
}

/// Renders both versions as one text, with every two-sided divergence
/// wrapped in merge markers.
pub fn render_conflict_markers(local: &str, remote: &str) -> String {
    let local_lines: Vec<&str> = local.split('\n').collect();
    let remote_lines: Vec<&str> = remote.split('\n').collect();
    let mut out: Vec<&str> = Vec::new();

    for hunk in align(&local_lines, &remote_lines) {
        match hunk {
            Hunk::Common(line) => out.push(line),
            Hunk::Diverged { local, remote } if local.is_empty() || remote.is_empty() => {
                out.extend(local);
                out.extend(remote);
            }
            Hunk::Diverged { local, remote } => {
                out.push("<<<<<<< local");
                out.extend(local);
                out.push(MARKER_SEPARATOR);
                out.extend(remote);
                out.push(">>>>>>> remote");
            }
        }
    }
    out.join("\n")
}

/// Returns true if the text contains a complete merge-marker block.
///
/// A block is an opening marker line, a separator, and a closing marker, in
/// that order.
pub fn has_conflict_markers(text: &str) -> bool {
    let mut stage = 0;
    for line in text.lines() {
        stage = match stage {
            0 if line.starts_with(MARKER_LOCAL) => 1,
            1 if line.trim_end() == MARKER_SEPARATOR => 2,
            2 if line.starts_with(MARKER_REMOTE) => return true,
            other => other,
        };
    }
    false
}
