//! Core of the invoice PDF retriever: domain records, ports, query building,
//! row decoding, naming, validation and the retrieval service.
//!
//! Adapters implement [`ports::PoolFactory`], [`ports::QueryExecutor`] and
//! [`ports::PdfStore`]; the CLI wires them into [`application::PdfRetriever`].

pub mod application;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod ports;
pub mod query;
pub mod rows;
pub mod utils;
pub mod validation;

pub use application::PdfRetriever;
pub use config::{AppConfig, DatabaseConfig};
pub use domain::{
    BlobRecord, InvoiceAttachmentRecord, InvoiceMetadata, RetrievalOptions, TableSelection,
};
pub use error::{DbErrorKind, ExtractorError, Result};
