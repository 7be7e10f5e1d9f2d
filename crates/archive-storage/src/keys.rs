//! Key encoding for storage layer.
//!
//! Key formats:
//! - `meta:{source_url}` for version cursors
//! - `rec:{table}:{record_url}` for table records
//! - `table:{table}` for table schema markers
//!
//! Table names never contain `:`, so the first two separators of a record
//! key are unambiguous even though URLs contain `:`.

/// Key for a source cursor
/// Format: meta:{url}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaKey {
    pub url: String,
}

impl MetaKey {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("meta:{}", self.url).into_bytes()
    }
}

/// Key for a record inside a table partition
/// Format: rec:{table}:{url}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKey {
    pub table: String,
    pub url: String,
}

impl RecordKey {
    pub fn new(table: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            url: url.into(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("rec:{}:{}", self.table, self.url).into_bytes()
    }

    /// Prefix covering a whole table partition
    pub fn table_prefix(table: &str) -> Vec<u8> {
        format!("rec:{}:", table).into_bytes()
    }

    /// Prefix covering every record of one source in a table.
    ///
    /// The trailing `/` keeps `mem://a` from matching `mem://ab`.
    pub fn origin_prefix(table: &str, origin: &str) -> Vec<u8> {
        format!("rec:{}:{}/", table, origin.trim_end_matches('/')).into_bytes()
    }
}

/// Key for a table schema marker
/// Format: table:{name}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableKey {
    pub name: String,
}

impl TableKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("table:{}", self.name).into_bytes()
    }
}
