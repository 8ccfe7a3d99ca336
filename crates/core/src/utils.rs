use crate::domain::{BlobRecord, InvoiceAttachmentRecord};
use std::collections::HashSet;

/// Prefix used by positional and id-based names when the caller supplies none.
pub const DEFAULT_PREFIX: &str = "pdf";

/// Everything a base filename can be derived from.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameParts<'a> {
    pub supplier_code: Option<&'a str>,
    pub month: Option<u32>,
    pub invoice_number: Option<&'a str>,
    pub row_id: Option<&'a str>,
    /// 1-based position of the record in the batch.
    pub position: usize,
}

impl<'a> NameParts<'a> {
    pub fn from_invoice(record: &'a InvoiceAttachmentRecord, position: usize) -> Self {
        Self {
            supplier_code: Some(&record.supplier_code),
            month: Some(record.month),
            invoice_number: Some(&record.supplier_invoice_number),
            row_id: None,
            position,
        }
    }

    pub fn from_blob(record: &'a BlobRecord, position: usize) -> Self {
        let invoice = record.invoice.as_ref();
        Self {
            supplier_code: invoice.map(|i| i.supplier_code.as_str()),
            month: invoice.map(|i| i.month),
            invoice_number: invoice.map(|i| i.supplier_invoice_number.as_str()),
            row_id: record.row_id.as_deref(),
            position,
        }
    }
}

/// Base filename (no extension) for a record:
/// `<supplier>-<month>-<invoice>` when the metadata is complete, otherwise
/// `<prefix>_<id>`, otherwise `<prefix>_<position>`.
pub fn base_filename(parts: &NameParts<'_>, prefix: Option<&str>) -> String {
    if let (Some(code), Some(month), Some(invoice)) =
        (parts.supplier_code, parts.month, parts.invoice_number)
    {
        return format!("{}-{}-{}", code, month, sanitize_filename(invoice));
    }

    let prefix = prefix.filter(|p| !p.is_empty()).unwrap_or(DEFAULT_PREFIX);
    match parts.row_id {
        Some(id) => format!("{}_{}", prefix, id),
        None => format!("{}_{}", prefix, parts.position),
    }
}

/// File names taken during one retrieval run. A base name that is already taken
/// gets `-2`, `-3`, ... appended, so two attachments of one invoice never share a
/// file. Names compare as the final `.pdf` file name, ignoring case.
#[derive(Debug, Default)]
pub struct NameRegistry {
    used: HashSet<String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// First free name for `base`, without taking it.
    pub fn available(&self, base: &str) -> String {
        if !self.is_taken(base) {
            return base.to_string();
        }
        let mut n = 2usize;
        loop {
            let candidate = format!("{}-{}", base, n);
            if !self.is_taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn take(&mut self, name: &str) {
        self.used.insert(registry_key(name));
    }

    /// `available` followed by `take`.
    pub fn claim(&mut self, base: &str) -> String {
        let name = self.available(base);
        self.take(&name);
        name
    }

    fn is_taken(&self, name: &str) -> bool {
        self.used.contains(&registry_key(name))
    }
}

fn registry_key(name: &str) -> String {
    with_pdf_extension(name).to_lowercase()
}

/// Replaces characters that are illegal in Windows filenames with underscores.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect()
}

/// Appends `.pdf` unless the name already ends with it, ignoring case.
pub fn with_pdf_extension(name: &str) -> String {
    let has_extension = name.len() >= 4
        && name.is_char_boundary(name.len() - 4)
        && name[name.len() - 4..].eq_ignore_ascii_case(".pdf");
    if has_extension {
        name.to_string()
    } else {
        format!("{}.pdf", name)
    }
}
