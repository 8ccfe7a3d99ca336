use crate::domain::{BlobRecord, InvoiceAttachmentRecord, TableSelection};
use crate::error::{ExtractorError, Result};
use crate::ports::{PoolFactory, QueryExecutor, ResultRow};
use crate::query::{
    table_blob_query, InvoiceAttachmentQuery, SqlQuery, BLOB_CONTENT, SUPPLIER_INVOICE_NUMBER,
};
use crate::rows::{
    decode_blob_row, decode_invoice_row, require_columns, RowDecodeError, INVOICE_COLUMNS,
};
use tracing::{debug, info, warn};

/// Owns the pool handle. `initialize` creates it, `close` releases it, and every
/// query in between fails with [`ExtractorError::NotInitialized`] if it is absent.
pub struct DatabaseService {
    factory: Box<dyn PoolFactory>,
    pool: Option<Box<dyn QueryExecutor>>,
}

impl DatabaseService {
    pub fn new(factory: Box<dyn PoolFactory>) -> Self {
        Self {
            factory,
            pool: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.is_some()
    }

    pub fn initialize(&mut self) -> Result<()> {
        if self.pool.is_some() {
            debug!("database pool already initialized");
            return Ok(());
        }
        self.pool = Some(self.factory.create_pool()?);
        info!("database connection pool created");
        Ok(())
    }

    /// Safe to call repeatedly, and before `initialize`.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut pool) = self.pool.take() {
            pool.close()?;
            info!("database connection pool closed");
        }
        Ok(())
    }

    fn pool(&self) -> Result<&dyn QueryExecutor> {
        self.pool.as_deref().ok_or(ExtractorError::NotInitialized)
    }

    /// Runs a trivial statement to prove the pool hands out working connections.
    pub fn ping(&self) -> Result<()> {
        let pool = self.pool()?;
        let query = SqlQuery::new("SELECT 1 AS OK FROM DUAL");
        let mut rows = 0usize;
        pool.for_each_row(&query, &mut |_| rows += 1)?;
        debug!(rows, "connection check returned");
        Ok(())
    }

    pub fn fetch_invoice_attachments(
        &self,
        query: &InvoiceAttachmentQuery,
    ) -> Result<Vec<InvoiceAttachmentRecord>> {
        let pool = self.pool()?;
        if query.is_empty() {
            info!("no invoice codes supplied, skipping query");
            return Ok(Vec::new());
        }

        let statements = query.to_sql();
        let total = statements.len();
        let mut records = Vec::new();
        for (n, sql) in statements.iter().enumerate() {
            info!(
                sql = %sql.sql(),
                params = sql.params().len(),
                statement = n + 1,
                of = total,
                "executing query"
            );
            records.extend(collect_rows(pool, sql, &INVOICE_COLUMNS, decode_invoice_row)?);
        }

        if records.is_empty() {
            info!("no rows found");
        }
        Ok(records)
    }

    pub fn fetch_table_blobs(&self, selection: &TableSelection) -> Result<Vec<BlobRecord>> {
        let pool = self.pool()?;
        let sql = table_blob_query(selection)?;
        info!(sql = %sql.sql(), "executing query");

        collect_rows(pool, &sql, &[BLOB_CONTENT], decode_blob_row)
    }
}

/// Decodes every row through `decode`, dropping the rows it rejects with a warning.
/// A missing column aborts the whole call since every row would fail the same way.
fn collect_rows<T>(
    pool: &dyn QueryExecutor,
    sql: &SqlQuery,
    columns: &[&str],
    decode: fn(&mut ResultRow) -> std::result::Result<T, RowDecodeError>,
) -> Result<Vec<T>> {
    let mut records = Vec::new();
    let mut shape_error: Option<ExtractorError> = None;
    let mut index = 0usize;

    pool.for_each_row(sql, &mut |mut row| {
        if shape_error.is_some() {
            return;
        }
        if let Err(e) = require_columns(&row, columns) {
            shape_error = Some(e);
            return;
        }
        index += 1;
        let invoice = row.text(SUPPLIER_INVOICE_NUMBER).map(str::to_string);
        match decode(&mut row) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                row = index,
                invoice = invoice.as_deref().unwrap_or("-"),
                error = %e,
                "unexpected data in row, skipping"
            ),
        }
    })?;

    match shape_error {
        Some(e) => Err(e),
        None => Ok(records),
    }
}

impl Drop for DatabaseService {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close database pool on drop");
        }
    }
}
