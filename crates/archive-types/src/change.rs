//! Change entries for archive history.
//!
//! A change entry records one historical mutation of a path. Entries are
//! produced by the archive's history capability and consumed, after
//! de-duplication, by the update applier.

use serde::{Deserialize, Serialize};

/// Kind of mutation recorded in history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// File written (created or overwritten)
    Put,
    /// File removed
    Del,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Put => write!(f, "put"),
            ChangeType::Del => write!(f, "del"),
        }
    }
}

/// One historical mutation of a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// Path inside the archive (always starts with `/`)
    pub path: String,

    /// Archive version that introduced this change
    pub version: u64,

    /// Kind of mutation
    #[serde(rename = "type")]
    pub change_type: ChangeType,
}

impl ChangeEntry {
    /// Create a put entry.
    pub fn put(path: impl Into<String>, version: u64) -> Self {
        Self {
            path: normalize_path(path.into()),
            version,
            change_type: ChangeType::Put,
        }
    }

    /// Create a del entry.
    pub fn del(path: impl Into<String>, version: u64) -> Self {
        Self {
            path: normalize_path(path.into()),
            version,
            change_type: ChangeType::Del,
        }
    }

    pub fn is_del(&self) -> bool {
        self.change_type == ChangeType::Del
    }
}

/// Prefix a path with `/` if it does not already have one.
pub fn normalize_path(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    }
}

/// Half-open version range `[start, end)`.
///
/// A synchronization pass scans `[cursor + 1, archive_version + 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRange {
    /// First version included
    pub start: u64,
    /// First version excluded
    pub end: u64,
}

impl VersionRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Range covering everything after `cursor` up to and including `target`.
    pub fn after(cursor: u64, target: u64) -> Self {
        Self {
            start: cursor + 1,
            end: target + 1,
        }
    }

    pub fn contains(&self, version: u64) -> bool {
        version >= self.start && version < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl std::fmt::Display for VersionRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_entry_normalizes_path() {
        let entry = ChangeEntry::put("posts/1.json", 3);
        assert_eq!(entry.path, "/posts/1.json");
        assert!(!entry.is_del());

        let entry = ChangeEntry::del("/posts/1.json", 4);
        assert_eq!(entry.path, "/posts/1.json");
        assert!(entry.is_del());
    }

    #[test]
    fn test_change_entry_json_format() {
        let entry = ChangeEntry::del("/a.json", 2);
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"path":"/a.json","version":2,"type":"del"}"#);
    }

    #[test]
    fn test_version_range_after_cursor() {
        let range = VersionRange::after(0, 3);
        assert_eq!(range, VersionRange::new(1, 4));
        assert!(range.contains(1));
        assert!(range.contains(3));
        assert!(!range.contains(4));
        assert!(!range.contains(0));
        assert_eq!(range.to_string(), "[1, 4)");
    }

    #[test]
    fn test_version_range_empty() {
        assert!(VersionRange::new(5, 5).is_empty());
        assert!(!VersionRange::after(4, 5).is_empty());
    }
}
