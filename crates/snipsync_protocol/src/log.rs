//! The append-only history log.
//!
//! The log text is the single source of truth for what happened to the
//! library. Devices only ever append to it; FORCE_CLEAR is the one sanctioned
//! way to void the past.
//!
//! # Invariants
//!
//! - The first entry is ADD or FORCE_CLEAR
//! - MODIFY and DELETE only touch paths that are live at that point
//! - A live path is never ADDed again
//! - Appending never rewrites existing text, so the log hash of a device's
//!   baseline is a prefix-stable fingerprint of what it has seen

use crate::entry::{format_timestamp, EntryKey, HistoryEntry, Operation};
use crate::hash::history_hash;
use crate::path::path_depth;
use crate::snapshot::Snapshot;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::warn;

/// Parses log text, skipping malformed lines with a warning.
pub fn parse_log(text: &str) -> Vec<HistoryEntry> {
    let mut entries = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match HistoryEntry::parse_line(line) {
            Ok(entry) => entries.push(entry),
            Err(reason) => warn!(line = idx + 1, %reason, "skipping malformed history line"),
        }
    }
    entries
}

/// Formats entries as log text, one line each, newline-terminated.
pub fn format_log(entries: &[HistoryEntry]) -> String {
    let mut text = String::new();
    for entry in entries {
        text.push_str(&entry.to_line());
        text.push('\n');
    }
    text
}

/// Appends one entry to log text.
///
/// If the new entry records the same change (operation, path and hash) as
/// the last entry, the text is returned unchanged. `timestamp` defaults to
/// now.
pub fn add_entry(
    text: &str,
    operation: Operation,
    path: &str,
    hash: &str,
    timestamp: Option<DateTime<Utc>>,
    device_tag: Option<&str>,
) -> String {
    let mut log = HistoryLog::parse(text);
    log.append(HistoryEntry::new(
        operation,
        path,
        hash,
        timestamp.unwrap_or_else(Utc::now),
        device_tag.map(str::to_string),
    ));
    log.into_text()
}

/// Sort key placing entries in canonical replay order.
///
/// Directory creations come first (shallow to deep), then file additions,
/// modifications and deletions, and finally directory deletions (deep to
/// shallow).
fn canonical_rank(entry: &HistoryEntry) -> (u8, i64) {
    let depth = path_depth(&entry.path) as i64;
    match (entry.operation, entry.is_directory()) {
        (Operation::ForceClear, _) => (0, 0),
        (Operation::Add | Operation::Modify, true) => (1, depth),
        (Operation::Add, false) => (2, 0),
        (Operation::Modify, false) => (3, 0),
        (Operation::Delete, false) => (4, 0),
        (Operation::Delete, true) => (5, -depth),
    }
}

/// Sorts entries into canonical replay order, ties broken by path.
pub fn canonical_sort(entries: &mut [HistoryEntry]) {
    entries.sort_by(|a, b| {
        canonical_rank(a)
            .cmp(&canonical_rank(b))
            .then_with(|| a.path.cmp(&b.path))
    });
}

/// Remote entries whose identity does not appear locally, in file order.
pub fn new_entries(remote: &[HistoryEntry], local: &[HistoryEntry]) -> Vec<HistoryEntry> {
    let seen: HashSet<EntryKey> = local.iter().map(HistoryEntry::key).collect();
    remote
        .iter()
        .filter(|entry| !seen.contains(&entry.key()))
        .cloned()
        .collect()
}

/// Net effect of a batch of new entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetChanges {
    /// True if the batch contains a FORCE_CLEAR.
    pub force_clear: bool,
    /// Last entry per path, in canonical order.
    pub entries: Vec<HistoryEntry>,
}

/// Collapses new entries to their last effect per path and orders them
/// canonically.
///
/// Several writers may have appended in any interleaving; only the final
/// state of each path matters to the receiver, and canonical order makes
/// that state safe to apply. Entries before a FORCE_CLEAR are dropped.
pub fn net_changes(entries: &[HistoryEntry]) -> NetChanges {
    let start = entries
        .iter()
        .rposition(|e| e.operation == Operation::ForceClear);
    let tail = match start {
        Some(idx) => &entries[idx + 1..],
        None => entries,
    };

    let mut last: BTreeMap<&str, &HistoryEntry> = BTreeMap::new();
    for entry in tail {
        last.insert(entry.path.as_str(), entry);
    }
    let mut collapsed: Vec<HistoryEntry> = last.into_values().cloned().collect();
    canonical_sort(&mut collapsed);

    NetChanges {
        force_clear: start.is_some(),
        entries: collapsed,
    }
}

/// A timestamp strictly after `last`, normally `now` at millisecond
/// precision.
pub fn next_timestamp(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let sub_ms = i64::from(now.timestamp_subsec_nanos() % 1_000_000);
    let now = now - Duration::nanoseconds(sub_ms);
    match last {
        Some(last) if now <= last => last + Duration::milliseconds(1),
        _ => now,
    }
}

/// A problem found by [`validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// 1-based line number in the log text.
    pub line: usize,
    /// What is wrong.
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Checks log text against the log invariants.
///
/// Returns every problem found; an empty vector means the log is valid.
pub fn validate(text: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut snapshot = Snapshot::new();
    let mut previous: Option<DateTime<Utc>> = None;
    let mut first = true;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let entry = match HistoryEntry::parse_line(line) {
            Ok(entry) => entry,
            Err(reason) => {
                issues.push(ValidationIssue {
                    line: line_no,
                    message: format!("malformed entry: {reason}"),
                });
                continue;
            }
        };

        if first && !matches!(entry.operation, Operation::Add | Operation::ForceClear) {
            issues.push(ValidationIssue {
                line: line_no,
                message: format!("log starts with {} instead of ADD or FORCE_CLEAR", entry.operation),
            });
        }
        first = false;

        if let Some(prev) = previous {
            if entry.timestamp < prev {
                issues.push(ValidationIssue {
                    line: line_no,
                    message: format!(
                        "timestamp {} is earlier than the previous entry ({})",
                        format_timestamp(&entry.timestamp),
                        format_timestamp(&prev)
                    ),
                });
            }
        }
        previous = Some(entry.timestamp);

        match entry.operation {
            Operation::Modify | Operation::Delete if !snapshot.is_live(&entry.path) => {
                issues.push(ValidationIssue {
                    line: line_no,
                    message: format!("{} of {} which is not live", entry.operation, entry.path),
                });
            }
            Operation::Add if snapshot.is_live(&entry.path) => {
                issues.push(ValidationIssue {
                    line: line_no,
                    message: format!("ADD of {} which is already live", entry.path),
                });
            }
            _ => {}
        }
        snapshot.apply(&entry);
    }

    issues
}

/// A parsed history log that keeps its original text.
///
/// Appending writes new lines after the existing text without reformatting
/// it, so hashes of the text only change by what was appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryLog {
    text: String,
    entries: Vec<HistoryEntry>,
}

impl HistoryLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses log text, skipping malformed lines.
    pub fn parse(text: &str) -> Self {
        Self {
            text: text.to_string(),
            entries: parse_log(text),
        }
    }

    /// Builds a log from entries.
    pub fn from_entries(entries: Vec<HistoryEntry>) -> Self {
        Self {
            text: format_log(&entries),
            entries,
        }
    }

    /// The log text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consumes the log, returning its text.
    pub fn into_text(self) -> String {
        self.text
    }

    /// Well-formed entries in file order.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Number of well-formed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the log has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Timestamp of the last entry.
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.entries.last().map(|e| e.timestamp)
    }

    /// Fingerprint of the log text.
    pub fn hash(&self) -> String {
        history_hash(&self.text)
    }

    /// Replays the log.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::replay(&self.entries)
    }

    /// Appends an entry unless it repeats the last change.
    ///
    /// Returns true if the entry was appended.
    pub fn append(&mut self, entry: HistoryEntry) -> bool {
        if self
            .entries
            .last()
            .is_some_and(|last| last.same_change(&entry))
        {
            return false;
        }
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }
        self.text.push_str(&entry.to_line());
        self.text.push('\n');
        self.entries.push(entry);
        true
    }

    /// Appends entries in order, returning how many were appended.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = HistoryEntry>) -> usize {
        entries.into_iter().map(|e| self.append(e)).filter(|&appended| appended).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::parse_timestamp;

    fn ts(text: &str) -> DateTime<Utc> {
        parse_timestamp(text).unwrap()
    }

    fn entry(op: Operation, path: &str, hash: &str, time: &str) -> HistoryEntry {
        HistoryEntry::new(op, path, hash, ts(time), Some("dev".into()))
    }

    #[test]
    fn parse_skips_malformed_lines() {
        let text = "\
+ | a/ | d | 2024-01-01T00:00:00.000Z
garbage line
? | a/x.snippet | h | 2024-01-01T00:00:01.000Z

+ | a/x.snippet | h | 2024-01-01T00:00:02.000Z | dev
";
        let entries = parse_log(text);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].path, "a/x.snippet");
    }

    #[test]
    fn format_is_inverse_of_parse() {
        let entries = vec![
            entry(Operation::Add, "a/", "d", "2024-01-01T00:00:00.000Z"),
            entry(Operation::Add, "a/x.snippet", "h", "2024-01-01T00:00:00.000Z"),
            entry(Operation::Delete, "a/x.snippet", "h", "2024-01-01T00:00:01.000Z"),
        ];
        let text = format_log(&entries);
        assert_eq!(parse_log(&text), entries);
        assert_eq!(format_log(&parse_log(&text)), text);
    }

    #[test]
    fn add_entry_suppresses_duplicates() {
        let t = Some(ts("2024-01-01T00:00:00.000Z"));
        let once = add_entry("", Operation::Add, "a.snippet", "h1", t, Some("dev"));
        let twice = add_entry(&once, Operation::Add, "a.snippet", "h1", t, Some("dev"));
        assert_eq!(once, twice);
        assert_eq!(parse_log(&twice).len(), 1);

        let changed = add_entry(&twice, Operation::Modify, "a.snippet", "h2", t, None);
        assert_eq!(parse_log(&changed).len(), 2);
    }

    #[test]
    fn append_keeps_existing_text() {
        let original = "+ | a/ | d | 2024-01-01T00:00:00+00:00";
        let mut log = HistoryLog::parse(original);
        log.append(entry(Operation::Add, "a/x.snippet", "h", "2024-01-01T00:00:01.000Z"));
        assert!(log.text().starts_with(original));
        assert!(log.text().ends_with("| dev\n"));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn canonical_sort_orders_by_kind_and_depth() {
        let t = "2024-01-01T00:00:00.000Z";
        let mut entries = vec![
            entry(Operation::Delete, "old/", "-", t),
            entry(Operation::Add, "a/b/c.snippet", "h", t),
            entry(Operation::Delete, "old/deep/", "-", t),
            entry(Operation::Add, "a/b/", "d", t),
            entry(Operation::Delete, "old/deep/x.snippet", "h", t),
            entry(Operation::Modify, "z.snippet", "h", t),
            entry(Operation::Add, "a/", "d", t),
        ];
        canonical_sort(&mut entries);
        let order: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "a/",
                "a/b/",
                "a/b/c.snippet",
                "z.snippet",
                "old/deep/x.snippet",
                "old/deep/",
                "old/",
            ]
        );
    }

    #[test]
    fn new_entries_use_identity_not_position() {
        let common = entry(Operation::Add, "a.snippet", "h1", "2024-01-01T00:00:00.000Z");
        let local = vec![common.clone()];
        let remote = vec![
            common,
            entry(Operation::Modify, "a.snippet", "h2", "2024-01-02T00:00:00.000Z"),
        ];
        let fresh = new_entries(&remote, &local);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].hash, "h2");
    }

    #[test]
    fn net_changes_collapse_per_path() {
        let entries = vec![
            entry(Operation::Add, "x.snippet", "h1", "2024-01-01T00:00:00.000Z"),
            entry(Operation::Delete, "x.snippet", "h1", "2024-01-01T00:00:01.000Z"),
            entry(Operation::Add, "x.snippet", "h2", "2024-01-01T00:00:02.000Z"),
            entry(Operation::Add, "d/", "d", "2024-01-01T00:00:03.000Z"),
        ];
        let net = net_changes(&entries);
        assert!(!net.force_clear);
        assert_eq!(net.entries.len(), 2);
        assert_eq!(net.entries[0].path, "d/");
        assert_eq!(net.entries[1].operation, Operation::Add);
        assert_eq!(net.entries[1].hash, "h2");
    }

    #[test]
    fn net_changes_drop_entries_before_force_clear() {
        let entries = vec![
            entry(Operation::Add, "x.snippet", "h1", "2024-01-01T00:00:00.000Z"),
            HistoryEntry::force_clear(ts("2024-01-01T00:00:01.000Z"), None),
            entry(Operation::Add, "y.snippet", "h2", "2024-01-01T00:00:02.000Z"),
        ];
        let net = net_changes(&entries);
        assert!(net.force_clear);
        assert_eq!(net.entries.len(), 1);
        assert_eq!(net.entries[0].path, "y.snippet");
    }

    #[test]
    fn next_timestamp_is_strictly_increasing() {
        let last = ts("2024-01-01T00:00:00.500Z");
        assert_eq!(
            next_timestamp(Some(last), ts("2024-01-01T00:00:00.100Z")),
            ts("2024-01-01T00:00:00.501Z")
        );
        assert_eq!(
            next_timestamp(Some(last), ts("2024-01-01T00:00:01.000Z")),
            ts("2024-01-01T00:00:01.000Z")
        );
        let precise = ts("2024-01-01T00:00:02.123456789Z");
        assert_eq!(next_timestamp(None, precise), ts("2024-01-01T00:00:02.123Z"));
    }

    #[test]
    fn validate_accepts_well_formed_log() {
        let text = "\
+ | a/ | d | 2024-01-01T00:00:00.000Z
+ | a/x.snippet | h | 2024-01-01T00:00:00.000Z
~ | a/x.snippet | h2 | 2024-01-01T00:00:01.000Z
- | a/x.snippet | h2 | 2024-01-01T00:00:02.000Z
+ | a/x.snippet | h3 | 2024-01-01T00:00:03.000Z
";
        assert!(validate(text).is_empty());
    }

    #[test]
    fn validate_flags_each_violation() {
        let text = "\
~ | a.snippet | h | 2024-01-01T00:00:05.000Z
+ | b.snippet | h | 2024-01-01T00:00:04.000Z
+ | b.snippet | h | 2024-01-01T00:00:06.000Z
- | c.snippet | h | 2024-01-01T00:00:07.000Z
nonsense
";
        let issues = validate(text);
        let lines: Vec<usize> = issues.iter().map(|i| i.line).collect();
        // line 1: bad first op and MODIFY of non-live path
        // line 2: timestamp regression
        // line 3: duplicate ADD
        // line 4: DELETE of non-live path
        // line 5: malformed
        assert_eq!(lines, vec![1, 1, 2, 3, 4, 5]);
        assert!(issues[0].message.contains("starts with MODIFY"));
        assert!(issues[2].to_string().starts_with("line 2:"));
    }

    #[test]
    fn force_clear_may_start_a_log() {
        let text = "! | * | * | 2024-01-01T00:00:00.000Z\n+ | a/ | d | 2024-01-01T00:00:01.000Z\n";
        assert!(validate(text).is_empty());
    }

    proptest::proptest! {
        #[test]
        fn awkward_paths_survive_the_text_format(
            names in proptest::collection::vec("[a-z %|~7C\\t\\n\\r]{1,8}", 1..6),
        ) {
            let entries: Vec<HistoryEntry> = names
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let time = format!("2024-01-01T00:00:{:02}.000Z", i);
                    entry(Operation::Add, &format!("{name}{i}.snippet"), "h", &time)
                })
                .collect();
            let text = format_log(&entries);
            proptest::prop_assert_eq!(text.lines().count(), entries.len());
            proptest::prop_assert_eq!(parse_log(&text), entries);
        }
    }
}
