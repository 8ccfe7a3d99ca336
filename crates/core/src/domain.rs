/// One attachment row of the invoice join, with its BLOB read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceAttachmentRecord {
    pub supplier_code: String,
    pub year: Option<i32>,
    pub month: u32,
    pub supplier_invoice_number: String,
    pub blob_content: Vec<u8>,
}

/// A BLOB pulled from an arbitrary table in generic extraction mode.
///
/// `invoice` is only populated when the latest-per-supplier window joins the
/// invoice metadata in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRecord {
    pub row_id: Option<String>,
    pub invoice: Option<InvoiceMetadata>,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceMetadata {
    pub supplier_code: String,
    pub year: Option<i32>,
    pub month: u32,
    pub supplier_invoice_number: String,
}

/// Targets an arbitrary table/BLOB column pair instead of the fixed invoice join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSelection {
    pub table_name: String,
    pub blob_column: String,
    pub id_column: Option<String>,
    /// Raw SQL predicate supplied by the operator. Not escaped.
    pub where_clause: Option<String>,
    pub filename_prefix: Option<String>,
    /// Keep only the most recent attachment per supplier. The table must carry an
    /// `INVOICE_ID` column joining it to `INVOICES`.
    pub latest_per_supplier: bool,
}

/// What a single `retrieve_pdfs` call should fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalOptions {
    Invoices {
        invoice_codes: Vec<String>,
        attachment_description: Option<String>,
    },
    Table(TableSelection),
}

impl RetrievalOptions {
    pub fn invoices<I, S>(codes: I, attachment_description: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RetrievalOptions::Invoices {
            invoice_codes: codes.into_iter().map(Into::into).collect(),
            attachment_description,
        }
    }
}
