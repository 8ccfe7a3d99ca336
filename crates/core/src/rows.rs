//! Typed decoding of result rows into records.
//!
//! Decoding happens inside the executor's row callback, so LOB handles are read
//! while the connection is still checked out of the pool.

use crate::domain::{BlobRecord, InvoiceAttachmentRecord, InvoiceMetadata};
use crate::error::ExtractorError;
use crate::ports::{ColumnValue, ResultRow};
use crate::query::{
    BLOB_CONTENT, INVOICE_MONTH, INVOICE_YEAR, ROW_ID, SUPPLIER_CODE, SUPPLIER_INVOICE_NUMBER,
};
use std::io::Read;
use thiserror::Error;

/// Why a single row could not be turned into a record. The row is dropped; the
/// batch carries on.
#[derive(Error, Debug)]
pub enum RowDecodeError {
    #[error("column {column} is NULL")]
    Null { column: &'static str },

    #[error("column {column} has unexpected type {found}")]
    UnexpectedType {
        column: &'static str,
        found: String,
    },

    #[error("column {column} value {value} is out of range")]
    OutOfRange { column: &'static str, value: i64 },

    #[error("failed to read LOB in column {column}: {source}")]
    LobRead {
        column: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Columns every invoice-attachment row must carry.
pub const INVOICE_COLUMNS: [&str; 5] = [
    SUPPLIER_CODE,
    INVOICE_YEAR,
    INVOICE_MONTH,
    SUPPLIER_INVOICE_NUMBER,
    BLOB_CONTENT,
];

/// Fails when a column is absent from the result set, which means the statement and
/// the decoder disagree. Checked once per row before any value is read.
pub fn require_columns(row: &ResultRow, columns: &[&str]) -> Result<(), ExtractorError> {
    match columns.iter().find(|c| !row.has_column(c)) {
        Some(missing) => Err(ExtractorError::MissingColumn((*missing).to_string())),
        None => Ok(()),
    }
}

pub fn decode_invoice_row(
    row: &mut ResultRow,
) -> Result<InvoiceAttachmentRecord, RowDecodeError> {
    let metadata = decode_metadata(row)?;
    let blob_content = decode_blob(row, BLOB_CONTENT)?;
    Ok(InvoiceAttachmentRecord {
        supplier_code: metadata.supplier_code,
        year: metadata.year,
        month: metadata.month,
        supplier_invoice_number: metadata.supplier_invoice_number,
        blob_content,
    })
}

/// Generic-mode rows: the id and invoice metadata are picked up when the statement
/// projected them.
pub fn decode_blob_row(row: &mut ResultRow) -> Result<BlobRecord, RowDecodeError> {
    let row_id = if row.has_column(ROW_ID) {
        optional_text(row, ROW_ID)?
    } else {
        None
    };
    let invoice = if row.has_column(SUPPLIER_CODE) {
        Some(decode_metadata(row)?)
    } else {
        None
    };
    let content = decode_blob(row, BLOB_CONTENT)?;
    Ok(BlobRecord {
        row_id,
        invoice,
        content,
    })
}

fn decode_metadata(row: &mut ResultRow) -> Result<InvoiceMetadata, RowDecodeError> {
    let supplier_code = required_text(row, SUPPLIER_CODE)?;
    let year = match optional_integer(row, INVOICE_YEAR)? {
        Some(y) => Some(i32::try_from(y).map_err(|_| RowDecodeError::OutOfRange {
            column: INVOICE_YEAR,
            value: y,
        })?),
        None => None,
    };
    let month = required_integer(row, INVOICE_MONTH)?;
    let month = u32::try_from(month)
        .ok()
        .filter(|m| (1..=12).contains(m))
        .ok_or(RowDecodeError::OutOfRange {
            column: INVOICE_MONTH,
            value: month,
        })?;
    let supplier_invoice_number = required_text(row, SUPPLIER_INVOICE_NUMBER)?;
    Ok(InvoiceMetadata {
        supplier_code,
        year,
        month,
        supplier_invoice_number,
    })
}

/// Accepts a LOB handle (read to completion) or materialized bytes.
pub fn decode_blob(row: &mut ResultRow, column: &'static str) -> Result<Vec<u8>, RowDecodeError> {
    match row.take(column) {
        Some(ColumnValue::Bytes(bytes)) => Ok(bytes),
        Some(ColumnValue::Lob(mut reader)) => {
            let mut buffer = Vec::new();
            reader
                .read_to_end(&mut buffer)
                .map_err(|source| RowDecodeError::LobRead { column, source })?;
            Ok(buffer)
        }
        Some(ColumnValue::Null) | None => Err(RowDecodeError::Null { column }),
        Some(other) => Err(unexpected(column, &other)),
    }
}

fn required_text(row: &mut ResultRow, column: &'static str) -> Result<String, RowDecodeError> {
    optional_text(row, column)?
        .filter(|s| !s.is_empty())
        .ok_or(RowDecodeError::Null { column })
}

fn optional_text(
    row: &mut ResultRow,
    column: &'static str,
) -> Result<Option<String>, RowDecodeError> {
    match row.take(column) {
        Some(ColumnValue::Text(s)) => Ok(Some(s)),
        Some(ColumnValue::Integer(i)) => Ok(Some(i.to_string())),
        Some(ColumnValue::Null) | None => Ok(None),
        Some(other) => Err(unexpected(column, &other)),
    }
}

fn required_integer(row: &mut ResultRow, column: &'static str) -> Result<i64, RowDecodeError> {
    optional_integer(row, column)?.ok_or(RowDecodeError::Null { column })
}

fn optional_integer(
    row: &mut ResultRow,
    column: &'static str,
) -> Result<Option<i64>, RowDecodeError> {
    match row.take(column) {
        Some(ColumnValue::Integer(i)) => Ok(Some(i)),
        // NUMBER columns sometimes arrive as text from the driver.
        Some(ColumnValue::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| RowDecodeError::UnexpectedType {
                column,
                found: format!("text {s:?}"),
            }),
        Some(ColumnValue::Null) | None => Ok(None),
        Some(other) => Err(unexpected(column, &other)),
    }
}

fn unexpected(column: &'static str, value: &ColumnValue) -> RowDecodeError {
    let found = match value {
        ColumnValue::Null => "NULL".to_string(),
        ColumnValue::Text(_) => "text".to_string(),
        ColumnValue::Integer(_) => "integer".to_string(),
        ColumnValue::Bytes(_) => "bytes".to_string(),
        ColumnValue::Lob(_) => "LOB".to_string(),
        ColumnValue::Unsupported(name) => name.clone(),
    };
    RowDecodeError::UnexpectedType { column, found }
}
