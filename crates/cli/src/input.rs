use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Reads a JSON array of invoice-code strings.
pub fn read_invoice_codes(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("cannot read invoice codes file {}", path.display()))?;
    parse_invoice_codes(&raw).with_context(|| format!("invalid invoice codes in {}", path.display()))
}

pub fn parse_invoice_codes(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str::<Vec<String>>(raw).context("expected a JSON array of strings")
}
