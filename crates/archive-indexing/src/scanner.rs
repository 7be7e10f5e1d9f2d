//! Change scanning.
//!
//! Turns raw archive history over a version range into the minimal set of
//! path-level changes: only the last change per path survives, only paths
//! matching a tracked table are kept, and the result is ordered by version.

use std::collections::HashMap;

use tracing::debug;

use archive_types::{ChangeEntry, VersionRange};

use crate::archive::Archive;
use crate::error::IndexingError;
use crate::table::TableSet;

/// Fetch history for `range` and collapse it. Does not touch storage.
pub async fn scan_changes(
    archive: &dyn Archive,
    range: VersionRange,
    tables: &TableSet,
) -> Result<Vec<ChangeEntry>, IndexingError> {
    let history = archive.history(range).await?;
    let total = history.len();
    let changes = collapse_changes(history, range, tables);

    debug!(
        url = %archive.url(),
        range = %range,
        history = total,
        changes = changes.len(),
        "Scanned changes"
    );

    Ok(changes)
}

/// Keep the latest in-range change per matching path, ascending by version.
///
/// Entries with equal versions keep history order for the same path and
/// are ordered by path otherwise, so output is deterministic.
pub fn collapse_changes(
    history: Vec<ChangeEntry>,
    range: VersionRange,
    tables: &TableSet,
) -> Vec<ChangeEntry> {
    let mut latest: HashMap<String, ChangeEntry> = HashMap::new();

    for entry in history {
        if !range.contains(entry.version) || !tables.matches_any(&entry.path) {
            continue;
        }
        match latest.get(&entry.path) {
            Some(existing) if existing.version > entry.version => {}
            _ => {
                latest.insert(entry.path.clone(), entry);
            }
        }
    }

    let mut changes: Vec<ChangeEntry> = latest.into_values().collect();
    changes.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.path.cmp(&b.path)));
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchive;
    use crate::table::Table;
    use serde_json::json;

    fn tables() -> TableSet {
        TableSet::new(vec![Table::new("files", "/*").unwrap()]).unwrap()
    }

    #[test]
    fn test_latest_change_per_path_wins() {
        let history = vec![
            ChangeEntry::put("/a", 1),
            ChangeEntry::put("/a", 3),
            ChangeEntry::del("/b", 2),
        ];

        let changes = collapse_changes(history, VersionRange::new(1, 4), &tables());
        assert_eq!(changes, vec![ChangeEntry::del("/b", 2), ChangeEntry::put("/a", 3)]);
    }

    #[test]
    fn test_put_then_delete_collapses_to_delete() {
        let history = vec![ChangeEntry::put("/a", 1), ChangeEntry::del("/a", 2)];
        let changes = collapse_changes(history, VersionRange::new(1, 3), &tables());
        assert_eq!(changes, vec![ChangeEntry::del("/a", 2)]);
    }

    #[test]
    fn test_out_of_range_and_unmatched_paths_dropped() {
        let tables = TableSet::new(vec![Table::new("posts", "/posts/*.json").unwrap()]).unwrap();
        let history = vec![
            ChangeEntry::put("/posts/1.json", 1),
            ChangeEntry::put("/posts/2.json", 5),
            ChangeEntry::put("/readme.md", 2),
            ChangeEntry::put("/posts/3.json", 3),
        ];

        let changes = collapse_changes(history, VersionRange::new(2, 5), &tables);
        assert_eq!(changes, vec![ChangeEntry::put("/posts/3.json", 3)]);
    }

    #[test]
    fn test_deterministic_order_for_equal_versions() {
        let history = vec![ChangeEntry::put("/b", 2), ChangeEntry::put("/a", 2)];
        let first = collapse_changes(history.clone(), VersionRange::new(1, 3), &tables());
        let second = collapse_changes(history, VersionRange::new(1, 3), &tables());
        assert_eq!(first, second);
        assert_eq!(first[0].path, "/a");
    }

    #[tokio::test]
    async fn test_scan_changes_reads_archive_history() {
        let archive = MemoryArchive::new("mem://alice");
        archive.put_json("/a", &json!(1));
        archive.put_json("/b", &json!(2));
        archive.put_json("/a", &json!(3));

        let changes = scan_changes(&archive, VersionRange::after(1, 3), &tables())
            .await
            .unwrap();
        assert_eq!(changes, vec![ChangeEntry::put("/b", 2), ChangeEntry::put("/a", 3)]);
        assert_eq!(archive.history_calls(), 1);
    }
}
