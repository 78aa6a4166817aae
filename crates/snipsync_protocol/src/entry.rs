//! History entries and their line format.
//!
//! One entry per line, fields separated by `|`:
//!
//! ```text
//! + | rust/ | 9f2c... | 2024-05-01T10:00:00.000Z | laptop
//! + | rust/args.snippet | 41ab... | 2024-05-01T10:00:00.000Z | laptop
//! ~ | rust/args.snippet | 77d0... | 2024-05-02T08:30:12.345Z
//! ! | * | * | 2024-06-01T00:00:00.000Z | desktop
//! ```
//!
//! `|` and `%` inside paths are percent-escaped so they cannot break the
//! field split.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

/// Path and hash placeholder used by FORCE_CLEAR entries.
const FORCE_CLEAR_FIELD: &str = "*";

/// Kind of history operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    /// Item was created.
    Add,
    /// Item content changed.
    Modify,
    /// Item was removed.
    Delete,
    /// Everything before this entry is void.
    ForceClear,
}

impl Operation {
    /// Single-character symbol used in the text format.
    pub fn symbol(&self) -> char {
        match self {
            Operation::Add => '+',
            Operation::Modify => '~',
            Operation::Delete => '-',
            Operation::ForceClear => '!',
        }
    }

    /// Parses a text-format symbol.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Operation::Add),
            "~" => Some(Operation::Modify),
            "-" => Some(Operation::Delete),
            "!" => Some(Operation::ForceClear),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Add => "ADD",
            Operation::Modify => "MODIFY",
            Operation::Delete => "DELETE",
            Operation::ForceClear => "FORCE_CLEAR",
        };
        f.write_str(name)
    }
}

/// Formats a timestamp as RFC 3339 with millisecond precision and `Z`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an RFC 3339 timestamp into UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Percent-escapes the characters that would break a log line: `%`, `|`,
/// line breaks, and whitespace at either end of the path (fields are
/// trimmed on parse).
fn escape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let last = path.char_indices().last().map_or(0, |(i, _)| i);
    for (i, c) in path.char_indices() {
        let edge = i == 0 || i == last;
        if matches!(c, '%' | '|' | '\n' | '\r') || (edge && c.is_whitespace()) {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{byte:02X}"));
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Reverses [`escape_path`]. A `%` not followed by two hex digits is kept
/// as is.
fn unescape_path(field: &str) -> Result<String, String> {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let decoded = (bytes[i] == b'%')
            .then(|| field.get(i + 1..i + 3))
            .flatten()
            .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        match decoded {
            Some(byte) => {
                out.push(byte);
                i += 3;
            }
            None => {
                out.push(bytes[i]);
                i += 1;
            }
        }
    }
    String::from_utf8(out).map_err(|_| format!("path {field:?} is not UTF-8 once unescaped"))
}

/// A single history log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// What happened.
    pub operation: Operation,
    /// Canonical path of the item.
    pub path: String,
    /// Content hash after the operation.
    pub hash: String,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Short identifier of the writing device.
    pub device_tag: Option<String>,
}

/// Identity of an entry, used to tell which remote entries a device has
/// already seen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    /// Timestamp in milliseconds since the epoch.
    pub timestamp_ms: i64,
    /// Operation.
    pub operation: Operation,
    /// Path.
    pub path: String,
    /// Hash.
    pub hash: String,
}

impl HistoryEntry {
    /// Creates an entry.
    pub fn new(
        operation: Operation,
        path: impl Into<String>,
        hash: impl Into<String>,
        timestamp: DateTime<Utc>,
        device_tag: Option<String>,
    ) -> Self {
        Self {
            operation,
            path: path.into(),
            hash: hash.into(),
            timestamp,
            device_tag,
        }
    }

    /// Creates a FORCE_CLEAR sentinel.
    pub fn force_clear(timestamp: DateTime<Utc>, device_tag: Option<String>) -> Self {
        Self::new(
            Operation::ForceClear,
            FORCE_CLEAR_FIELD,
            FORCE_CLEAR_FIELD,
            timestamp,
            device_tag,
        )
    }

    /// Returns true if the entry concerns a directory.
    pub fn is_directory(&self) -> bool {
        self.operation != Operation::ForceClear && crate::path::is_directory_path(&self.path)
    }

    /// Returns the identity key of this entry.
    pub fn key(&self) -> EntryKey {
        EntryKey {
            timestamp_ms: self.timestamp.timestamp_millis(),
            operation: self.operation,
            path: self.path.clone(),
            hash: self.hash.clone(),
        }
    }

    /// Returns true if `other` records the same operation on the same
    /// content, ignoring time and device.
    pub fn same_change(&self, other: &HistoryEntry) -> bool {
        self.operation == other.operation && self.path == other.path && self.hash == other.hash
    }

    /// Formats the entry as one log line, without a newline.
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{} | {} | {} | {}",
            self.operation.symbol(),
            escape_path(&self.path),
            self.hash,
            format_timestamp(&self.timestamp)
        );
        if let Some(tag) = &self.device_tag {
            line.push_str(" | ");
            line.push_str(tag);
        }
        line
    }

    /// Parses one log line.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem for malformed lines.
    pub fn parse_line(line: &str) -> Result<Self, String> {
        let fields: Vec<&str> = line.split('|').map(str::trim).collect();
        if fields.len() != 4 && fields.len() != 5 {
            return Err(format!("expected 4 or 5 fields, found {}", fields.len()));
        }

        let operation = Operation::from_symbol(fields[0])
            .ok_or_else(|| format!("unknown operation {:?}", fields[0]))?;
        if fields[1].is_empty() {
            return Err("empty path".to_string());
        }
        if fields[2].is_empty() {
            return Err("empty hash".to_string());
        }
        let path = unescape_path(fields[1])?;
        let timestamp = parse_timestamp(fields[3])
            .ok_or_else(|| format!("invalid timestamp {:?}", fields[3]))?;
        let device_tag = fields
            .get(4)
            .filter(|tag| !tag.is_empty())
            .map(|tag| tag.to_string());

        Ok(Self {
            operation,
            path,
            hash: fields[2].to_string(),
            timestamp,
            device_tag,
        })
    }
}
