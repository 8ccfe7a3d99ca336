//! SQL statements for the attachment join and the generic table extraction.
//!
//! Caller-supplied values are always bound as positional parameters (`:1`, `:2`, ...).
//! Identifiers in generic mode cannot be bound, so they are checked against
//! [`is_plain_identifier`] before being spliced into the text.

use crate::domain::TableSelection;
use crate::error::{ExtractorError, Result};
use std::collections::HashSet;

pub const SUPPLIER_CODE: &str = "SUPPLIER_CODE";
pub const INVOICE_YEAR: &str = "INVOICE_YEAR";
pub const INVOICE_MONTH: &str = "INVOICE_MONTH";
pub const SUPPLIER_INVOICE_NUMBER: &str = "SUPPLIER_INVOICE_NUMBER";
pub const BLOB_CONTENT: &str = "BLOB_CONTENT";
pub const ROW_ID: &str = "ROW_ID";

/// Oracle rejects `IN` lists longer than this (ORA-01795).
pub const MAX_IN_LIST: usize = 1000;

/// A bound value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    Integer(i64),
}

/// Statement text plus its positional parameters, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlQuery {
    sql: String,
    params: Vec<SqlParam>,
}

impl SqlQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    /// Appends a parameter and returns its placeholder.
    fn bind(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!(":{}", self.params.len())
    }
}

/// Attachments of the given supplier invoice numbers, optionally restricted to one
/// attachment description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceAttachmentQuery {
    invoice_codes: Vec<String>,
    attachment_description: Option<String>,
}

impl InvoiceAttachmentQuery {
    /// Duplicate codes are collapsed, keeping the first occurrence.
    pub fn new<I, S>(codes: I, attachment_description: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut invoice_codes: Vec<String> = Vec::new();
        for code in codes {
            let code = code.into();
            if seen.insert(code.clone()) {
                invoice_codes.push(code);
            }
        }
        Self {
            invoice_codes,
            attachment_description,
        }
    }

    pub fn invoice_codes(&self) -> &[String] {
        &self.invoice_codes
    }

    pub fn attachment_description(&self) -> Option<&str> {
        self.attachment_description.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.invoice_codes.is_empty()
    }

    /// One statement per [`MAX_IN_LIST`] codes, in code order. Each statement
    /// numbers its own placeholders from `:1` and repeats the description bind.
    pub fn to_sql(&self) -> Vec<SqlQuery> {
        self.invoice_codes
            .chunks(MAX_IN_LIST)
            .map(|chunk| self.chunk_sql(chunk))
            .collect()
    }

    fn chunk_sql(&self, codes: &[String]) -> SqlQuery {
        let mut query = SqlQuery::new(String::new());

        let placeholders: Vec<String> = codes
            .iter()
            .map(|code| query.bind(SqlParam::Text(code.clone())))
            .collect();

        let mut sql = format!(
            "SELECT s.CODE AS {SUPPLIER_CODE}, \
             EXTRACT(YEAR FROM i.INVOICE_DATE) AS {INVOICE_YEAR}, \
             EXTRACT(MONTH FROM i.INVOICE_DATE) AS {INVOICE_MONTH}, \
             i.SUPPLIER_IV_NUM AS {SUPPLIER_INVOICE_NUMBER}, \
             ia.BLOB_CONTENT AS {BLOB_CONTENT} \
             FROM INVOICE_ATTACHMENTS ia \
             JOIN INVOICES i ON ia.INVOICE_ID = i.ID \
             JOIN SUPPLIERS s ON i.SUPPLIER_ID = s.ID \
             WHERE i.SUPPLIER_IV_NUM IN ({})",
            placeholders.join(", ")
        );

        if let Some(description) = &self.attachment_description {
            let placeholder = query.bind(SqlParam::Text(description.clone()));
            sql.push_str(&format!(" AND ia.DESCRIPTION = {placeholder}"));
        }

        query.sql = sql;
        query
    }
}

/// Builds the generic-mode statement for `selection`.
///
/// Plain mode projects the optional id column and the BLOB column. With
/// `latest_per_supplier`, the table is joined to invoices and suppliers and ranked
/// by invoice date per supplier code, keeping rank 1.
pub fn table_blob_query(selection: &TableSelection) -> Result<SqlQuery> {
    check_identifier("table name", &selection.table_name)?;
    check_identifier("BLOB column", &selection.blob_column)?;
    if let Some(id) = &selection.id_column {
        check_identifier("id column", id)?;
    }

    let id_projection = selection
        .id_column
        .as_ref()
        .map(|id| format!("t.{id} AS {ROW_ID}, "))
        .unwrap_or_default();
    let where_sql = selection
        .where_clause
        .as_deref()
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(|w| format!(" WHERE {w}"))
        .unwrap_or_default();

    let table = &selection.table_name;
    let blob = &selection.blob_column;

    let sql = if selection.latest_per_supplier {
        let outer_id = if selection.id_column.is_some() {
            format!("{ROW_ID}, ")
        } else {
            String::new()
        };
        format!(
            "SELECT {outer_id}{SUPPLIER_CODE}, {INVOICE_YEAR}, {INVOICE_MONTH}, \
             {SUPPLIER_INVOICE_NUMBER}, {BLOB_CONTENT} FROM (\
             SELECT {id_projection}s.CODE AS {SUPPLIER_CODE}, \
             EXTRACT(YEAR FROM i.INVOICE_DATE) AS {INVOICE_YEAR}, \
             EXTRACT(MONTH FROM i.INVOICE_DATE) AS {INVOICE_MONTH}, \
             i.SUPPLIER_IV_NUM AS {SUPPLIER_INVOICE_NUMBER}, \
             t.{blob} AS {BLOB_CONTENT}, \
             ROW_NUMBER() OVER (PARTITION BY s.CODE ORDER BY i.INVOICE_DATE DESC) AS RN \
             FROM {table} t \
             JOIN INVOICES i ON t.INVOICE_ID = i.ID \
             JOIN SUPPLIERS s ON i.SUPPLIER_ID = s.ID{where_sql}) \
             WHERE RN = 1"
        )
    } else {
        format!("SELECT {id_projection}t.{blob} AS {BLOB_CONTENT} FROM {table} t{where_sql}")
    };

    Ok(SqlQuery::new(sql))
}

/// `[A-Za-z][A-Za-z0-9_$#]*`, optionally schema-qualified with a single dot.
pub fn is_plain_identifier(name: &str) -> bool {
    let part_ok = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '#'))
    };
    match name.split_once('.') {
        Some((schema, object)) => part_ok(schema) && part_ok(object),
        None => part_ok(name),
    }
}

fn check_identifier(what: &str, name: &str) -> Result<()> {
    if is_plain_identifier(name) {
        Ok(())
    } else {
        Err(ExtractorError::InvalidOptions(format!(
            "{what} {name:?} is not a plain SQL identifier"
        )))
    }
}
