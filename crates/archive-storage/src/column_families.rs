//! Column family definitions for RocksDB.
//!
//! - index_meta: One version cursor per source
//! - records: Table partitions, keyed `rec:{table}:{url}`
//! - table_meta: Stored schema version per table

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for per-source cursors
pub const CF_INDEX_META: &str = "index_meta";

/// Column family name for table records
pub const CF_RECORDS: &str = "records";

/// Column family name for table schema markers
pub const CF_TABLE_META: &str = "table_meta";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_INDEX_META, CF_RECORDS, CF_TABLE_META];

/// Records are rewritten often and read by prefix
fn records_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_INDEX_META, Options::default()),
        ColumnFamilyDescriptor::new(CF_RECORDS, records_options()),
        ColumnFamilyDescriptor::new(CF_TABLE_META, Options::default()),
    ]
}
