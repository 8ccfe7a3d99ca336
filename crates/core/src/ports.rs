use crate::error::Result;
use crate::query::SqlQuery;
use crate::validation::is_valid_pdf;
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use tracing::error;

/// A single column value as handed over by the database adapter.
pub enum ColumnValue {
    Null,
    Text(String),
    Integer(i64),
    /// Already materialized binary content (RAW, LONG RAW, or a prefetched LOB).
    Bytes(Vec<u8>),
    /// Large-object handle; must be read to completion while the connection is held.
    Lob(Box<dyn Read>),
    /// Anything the adapter could not express as one of the above, by type name.
    Unsupported(String),
}

impl std::fmt::Debug for ColumnValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnValue::Null => f.write_str("Null"),
            ColumnValue::Text(s) => f.debug_tuple("Text").field(s).finish(),
            ColumnValue::Integer(i) => f.debug_tuple("Integer").field(i).finish(),
            ColumnValue::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            ColumnValue::Lob(_) => f.write_str("Lob(..)"),
            ColumnValue::Unsupported(t) => f.debug_tuple("Unsupported").field(t).finish(),
        }
    }
}

/// One result row keyed by upper-cased column name.
#[derive(Debug, Default)]
pub struct ResultRow {
    columns: HashMap<String, ColumnValue>,
}

impl ResultRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: ColumnValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: ColumnValue) {
        self.columns.insert(name.to_ascii_uppercase(), value);
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(&name.to_ascii_uppercase())
    }

    /// Borrows a text value, if the column holds one.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.columns.get(&name.to_ascii_uppercase()) {
            Some(ColumnValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Moves the value out of the row, leaving `Null` behind.
    pub fn take(&mut self, name: &str) -> Option<ColumnValue> {
        self.columns
            .get_mut(&name.to_ascii_uppercase())
            .map(|v| std::mem::replace(v, ColumnValue::Null))
    }
}

/// Runs statements against an open pool. Each call borrows one connection and
/// returns it before returning, on success and on failure.
pub trait QueryExecutor {
    /// Executes `query` and hands every row to `on_row` while the connection is
    /// still held, so LOB handles in the row can be read.
    fn for_each_row(&self, query: &SqlQuery, on_row: &mut dyn FnMut(ResultRow)) -> Result<()>;

    /// Releases the pool. Called once by the owner.
    fn close(&mut self) -> Result<()>;
}

/// Creates the pool behind a `QueryExecutor`.
pub trait PoolFactory {
    fn create_pool(&self) -> Result<Box<dyn QueryExecutor>>;
}

/// Persists PDF buffers under an output directory.
pub trait PdfStore {
    /// Creates the output directory when it does not exist yet.
    fn ensure_output_directory(&self) -> Result<()>;

    /// Writes `buffer` as `<dir>/<base_name>.pdf` and returns the path written.
    fn save(&self, buffer: &[u8], base_name: &str) -> Result<PathBuf>;

    /// Saves the buffer only if it carries the PDF signature. `Ok(None)` means the
    /// buffer was rejected; reporting it is left to the caller.
    fn validate_and_save(&self, buffer: &[u8], base_name: &str) -> Result<Option<PathBuf>> {
        if !is_valid_pdf(buffer) {
            return Ok(None);
        }
        self.save(buffer, base_name).map(Some)
    }

    /// Best-effort batch save: failures are logged and skipped.
    fn save_batch(&self, items: &[(String, Vec<u8>)]) -> Vec<PathBuf> {
        let mut saved = Vec::with_capacity(items.len());
        for (base_name, buffer) in items {
            match self.save(buffer, base_name) {
                Ok(path) => saved.push(path),
                Err(e) => error!(file = %base_name, error = %e, "failed to save PDF, continuing"),
            }
        }
        saved
    }
}
