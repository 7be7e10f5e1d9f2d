//! Table definitions.
//!
//! A table is a named projection rule: a path pattern selecting archive files
//! plus a schema that validates and optionally transforms their content.
//! Each table owns one storage partition.

use std::sync::Arc;

use globset::{Glob, GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use serde_json::Value;

use crate::error::IndexingError;

/// Validation and preprocessing hooks for one record type.
///
/// Both hooks default to accepting the record unchanged.
pub trait RecordSchema: Send + Sync {
    /// Whether `record` belongs in the table.
    fn validate(&self, _record: &Value) -> bool {
        true
    }

    /// Transform a valid record before it is stored.
    ///
    /// Returning `None` drops the record, which removes any stored copy.
    fn preprocess(&self, record: Value) -> Option<Value> {
        Some(record)
    }
}

/// Schema that accepts JSON objects carrying every listed field.
#[derive(Debug, Clone, Default)]
pub struct RequiredFields {
    fields: Vec<String>,
}

impl RequiredFields {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl RecordSchema for RequiredFields {
    fn validate(&self, record: &Value) -> bool {
        match record.as_object() {
            Some(obj) => self.fields.iter().all(|f| obj.contains_key(f)),
            None => false,
        }
    }
}

fn glob(pattern: &str) -> Result<Glob, globset::Error> {
    GlobBuilder::new(pattern).literal_separator(true).build()
}

/// Compile path patterns into one set. `*` never crosses `/`.
pub(crate) fn build_glob_set(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    patterns
        .iter()
        .try_fold(GlobSetBuilder::new(), |mut builder, pattern| {
            builder.add(glob(pattern)?);
            Ok::<_, globset::Error>(builder)
        })?
        .build()
}

/// A named projection rule over archive files.
#[derive(Clone)]
pub struct Table {
    name: String,
    pattern: String,
    matcher: GlobMatcher,
    schema_version: u32,
    schema: Option<Arc<dyn RecordSchema>>,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .field("schema_version", &self.schema_version)
            .field("has_schema", &self.schema.is_some())
            .finish()
    }
}

impl Table {
    /// Create a table matching `pattern` (a glob such as `/posts/*.json`).
    ///
    /// Table names are used in storage keys and may not contain `:`.
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Result<Self, IndexingError> {
        let name = name.into();
        let pattern = pattern.into();

        if name.is_empty() || name.contains(':') {
            return Err(IndexingError::Table(format!(
                "invalid table name '{}': must be non-empty without ':'",
                name
            )));
        }

        let matcher = glob(&pattern)
            .map_err(|e| IndexingError::Table(format!("table '{}': {}", name, e)))?
            .compile_matcher();

        Ok(Self {
            name,
            pattern,
            matcher,
            schema_version: 1,
            schema: None,
        })
    }

    /// Attach a schema.
    pub fn with_schema(mut self, schema: impl RecordSchema + 'static) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    /// Set the schema version. Changing it marks stored records outdated.
    pub fn with_schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Whether `path` belongs to this table.
    pub fn matches(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }

    /// Run validation. Tables without a schema accept everything.
    pub fn validate(&self, record: &Value) -> bool {
        self.schema.as_ref().map_or(true, |s| s.validate(record))
    }

    /// Run preprocessing. Tables without a schema keep the record as is.
    pub fn preprocess(&self, record: Value) -> Option<Value> {
        match &self.schema {
            Some(schema) => schema.preprocess(record),
            None => Some(record),
        }
    }
}

/// The set of tracked tables.
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    tables: Vec<Arc<Table>>,
}

impl TableSet {
    /// Build a set, rejecting duplicate names.
    pub fn new(tables: Vec<Table>) -> Result<Self, IndexingError> {
        let mut set = Self::default();
        for table in tables {
            if set.get(table.name()).is_some() {
                return Err(IndexingError::Table(format!(
                    "duplicate table '{}'",
                    table.name()
                )));
            }
            set.tables.push(Arc::new(table));
        }
        Ok(set)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Table>> {
        self.tables.iter().find(|t| t.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Table>> {
        self.tables.iter()
    }

    /// Tables whose pattern matches `path`.
    pub fn matching<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Arc<Table>> + 'a {
        self.tables.iter().filter(move |t| t.matches(path))
    }

    pub fn matches_any(&self, path: &str) -> bool {
        self.tables.iter().any(|t| t.matches(path))
    }

    pub fn names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name()).collect()
    }

    pub fn patterns(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.pattern().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
