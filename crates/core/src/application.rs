use crate::database::DatabaseService;
use crate::domain::{RetrievalOptions, TableSelection};
use crate::error::Result;
use crate::ports::{PdfStore, PoolFactory};
use crate::query::InvoiceAttachmentQuery;
use crate::utils::{base_filename, NameParts, NameRegistry};
use crate::validation::is_valid_pdf;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Pulls attachments out of the database and writes the valid PDFs to the store.
pub struct PdfRetriever {
    database: DatabaseService,
    store: Box<dyn PdfStore>,
}

impl PdfRetriever {
    /// Creates a new PdfRetriever with the given dependencies
    pub fn new(pool_factory: Box<dyn PoolFactory>, store: Box<dyn PdfStore>) -> Self {
        Self {
            database: DatabaseService::new(pool_factory),
            store,
        }
    }

    /// Creates the connection pool. Must run before `retrieve_pdfs`.
    pub fn initialize(&mut self) -> Result<()> {
        self.database.initialize()
    }

    pub fn close(&mut self) -> Result<()> {
        self.database.close()
    }

    /// Fails with `NotInitialized` when called before `initialize`.
    pub fn check_connection(&self) -> Result<()> {
        self.database.ping()
    }

    /// Runs query, naming, validation and writing; returns the written paths in
    /// query order. Bad rows and failed writes are logged and skipped; query and
    /// connection failures are returned.
    pub fn retrieve_pdfs(&self, options: &RetrievalOptions) -> Result<Vec<PathBuf>> {
        match options {
            RetrievalOptions::Invoices {
                invoice_codes,
                attachment_description,
            } => {
                let query =
                    InvoiceAttachmentQuery::new(invoice_codes.iter(), attachment_description.clone());
                self.retrieve_invoice_attachments(&query)
            }
            RetrievalOptions::Table(selection) => self.retrieve_table_blobs(selection),
        }
    }

    fn retrieve_invoice_attachments(&self, query: &InvoiceAttachmentQuery) -> Result<Vec<PathBuf>> {
        info!(
            codes = query.invoice_codes().len(),
            description = query.attachment_description().unwrap_or("-"),
            "starting PDF retrieval from INVOICE_ATTACHMENTS.BLOB_CONTENT"
        );

        let records = self.database.fetch_invoice_attachments(query)?;
        if records.is_empty() {
            info!("no PDF data found");
            return Ok(Vec::new());
        }
        info!(count = records.len(), "found PDF(s) to save");

        let mut names = NameRegistry::new();
        let mut saved = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            let base = base_filename(&NameParts::from_invoice(record, index + 1), None);
            let name = names.available(&base);
            match self.store.validate_and_save(&record.blob_content, &name) {
                Ok(Some(path)) => {
                    if name != base {
                        info!(
                            invoice = %record.supplier_invoice_number,
                            file = %name,
                            "name already used in this run, added suffix"
                        );
                    }
                    names.take(&name);
                    saved.push(path);
                }
                Ok(None) => warn!(
                    invoice = %record.supplier_invoice_number,
                    "skipping invalid PDF data"
                ),
                Err(e) => error!(
                    invoice = %record.supplier_invoice_number,
                    error = %e,
                    "failed to save PDF, continuing"
                ),
            }
        }

        Ok(saved)
    }

    fn retrieve_table_blobs(&self, selection: &TableSelection) -> Result<Vec<PathBuf>> {
        info!(
            table = %selection.table_name,
            column = %selection.blob_column,
            latest_per_supplier = selection.latest_per_supplier,
            "starting PDF retrieval"
        );

        let records = self.database.fetch_table_blobs(selection)?;
        if records.is_empty() {
            info!("no PDF data found");
            return Ok(Vec::new());
        }
        info!(count = records.len(), "found PDF(s) to save");

        let prefix = selection.filename_prefix.as_deref();
        let mut names = NameRegistry::new();
        let mut batch = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            if is_valid_pdf(&record.content) {
                let base = base_filename(&NameParts::from_blob(&record, index + 1), prefix);
                batch.push((names.claim(&base), record.content));
            } else {
                warn!(
                    row = index + 1,
                    id = record.row_id.as_deref().unwrap_or("-"),
                    "skipping invalid PDF data"
                );
            }
        }

        Ok(self.store.save_batch(&batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DbErrorKind, ExtractorError};
    use crate::ports::{ColumnValue, QueryExecutor, ResultRow};
    use crate::query::{
        SqlParam, SqlQuery, BLOB_CONTENT, INVOICE_MONTH, INVOICE_YEAR, ROW_ID, SUPPLIER_CODE,
        SUPPLIER_INVOICE_NUMBER,
    };
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::io::Cursor;
    use std::path::Path;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    /// Counts WARN events emitted while installed.
    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// An attachment row as it would sit in the joined tables.
    #[derive(Clone)]
    struct FixtureRow {
        supplier_code: &'static str,
        month: i64,
        invoice_number: &'static str,
        description: &'static str,
        blob: Vec<u8>,
        as_lob: bool,
    }

    impl FixtureRow {
        fn new(supplier_code: &'static str, month: i64, invoice_number: &'static str, blob: &[u8]) -> Self {
            Self {
                supplier_code,
                month,
                invoice_number,
                description: "Original",
                blob: blob.to_vec(),
                as_lob: false,
            }
        }

        fn to_row(&self) -> ResultRow {
            let blob = if self.as_lob {
                ColumnValue::Lob(Box::new(Cursor::new(self.blob.clone())))
            } else {
                ColumnValue::Bytes(self.blob.clone())
            };
            ResultRow::new()
                .with(SUPPLIER_CODE, ColumnValue::Text(self.supplier_code.into()))
                .with(INVOICE_YEAR, ColumnValue::Integer(2025))
                .with(INVOICE_MONTH, ColumnValue::Integer(self.month))
                .with(SUPPLIER_INVOICE_NUMBER, ColumnValue::Text(self.invoice_number.into()))
                .with(BLOB_CONTENT, blob)
        }
    }

    #[derive(Default)]
    struct ExecutorLog {
        statements: Vec<SqlQuery>,
        closed: usize,
    }

    /// Applies the membership and description predicates of the invoice statement
    /// to an in-memory table; any other statement returns `raw_rows`.
    struct FakeExecutor {
        table: Vec<FixtureRow>,
        raw_rows: Vec<fn() -> ResultRow>,
        fail_with: Option<DbErrorKind>,
        log: Rc<RefCell<ExecutorLog>>,
    }

    impl QueryExecutor for FakeExecutor {
        fn for_each_row(&self, query: &SqlQuery, on_row: &mut dyn FnMut(ResultRow)) -> Result<()> {
            self.log.borrow_mut().statements.push(query.clone());
            if let Some(kind) = self.fail_with {
                return Err(ExtractorError::database(kind, Some(942), "table or view does not exist"));
            }
            if !query.sql().contains("SUPPLIER_IV_NUM IN") {
                for make in &self.raw_rows {
                    on_row(make());
                }
                return Ok(());
            }

            let texts: Vec<&str> = query
                .params()
                .iter()
                .map(|p| match p {
                    SqlParam::Text(s) => s.as_str(),
                    SqlParam::Integer(_) => panic!("unexpected integer parameter"),
                })
                .collect();
            let (codes, description) = if query.sql().contains("ia.DESCRIPTION = ") {
                (&texts[..texts.len() - 1], texts.last().copied())
            } else {
                (&texts[..], None)
            };

            for fixture in &self.table {
                let code_matches = codes.contains(&fixture.invoice_number);
                let description_matches = description.map_or(true, |d| d == fixture.description);
                if code_matches && description_matches {
                    on_row(fixture.to_row());
                }
            }
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.log.borrow_mut().closed += 1;
            Ok(())
        }
    }

    struct FakeFactory {
        table: Vec<FixtureRow>,
        raw_rows: Vec<fn() -> ResultRow>,
        fail_with: Option<DbErrorKind>,
        log: Rc<RefCell<ExecutorLog>>,
    }

    impl PoolFactory for FakeFactory {
        fn create_pool(&self) -> Result<Box<dyn QueryExecutor>> {
            Ok(Box::new(FakeExecutor {
                table: self.table.clone(),
                raw_rows: self.raw_rows.clone(),
                fail_with: self.fail_with,
                log: Rc::clone(&self.log),
            }))
        }
    }

    /// Keeps written files in memory; names listed in `fail_on` cannot be written.
    #[derive(Default)]
    struct MemoryStore {
        files: Rc<RefCell<BTreeMap<String, Vec<u8>>>>,
        fail_on: Vec<&'static str>,
    }

    impl PdfStore for MemoryStore {
        fn ensure_output_directory(&self) -> Result<()> {
            Ok(())
        }

        fn save(&self, buffer: &[u8], base_name: &str) -> Result<PathBuf> {
            let file_name = crate::utils::with_pdf_extension(base_name);
            let path = Path::new("out").join(&file_name);
            if self.fail_on.iter().any(|f| *f == base_name) {
                return Err(ExtractorError::Write {
                    path,
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
                });
            }
            self.files.borrow_mut().insert(file_name, buffer.to_vec());
            Ok(path)
        }
    }

    struct Harness {
        retriever: PdfRetriever,
        files: Rc<RefCell<BTreeMap<String, Vec<u8>>>>,
        log: Rc<RefCell<ExecutorLog>>,
    }

    fn harness(table: Vec<FixtureRow>) -> Harness {
        harness_with(table, Vec::new(), None, Vec::new())
    }

    fn harness_with(
        table: Vec<FixtureRow>,
        raw_rows: Vec<fn() -> ResultRow>,
        fail_with: Option<DbErrorKind>,
        fail_on: Vec<&'static str>,
    ) -> Harness {
        let log = Rc::new(RefCell::new(ExecutorLog::default()));
        let files = Rc::new(RefCell::new(BTreeMap::new()));
        let factory = FakeFactory {
            table,
            raw_rows,
            fail_with,
            log: Rc::clone(&log),
        };
        let store = MemoryStore {
            files: Rc::clone(&files),
            fail_on,
        };
        Harness {
            retriever: PdfRetriever::new(Box::new(factory), Box::new(store)),
            files,
            log,
        }
    }

    #[test]
    fn test_retrieve_before_initialize_fails_fast() {
        let h = harness(vec![FixtureRow::new("SUP7", 6, "INV-001", b"%PDF-1.4")]);
        let result = h.retriever.retrieve_pdfs(&RetrievalOptions::invoices(["INV-001"], None));
        assert!(matches!(result, Err(ExtractorError::NotInitialized)));
        assert!(h.log.borrow().statements.is_empty());
    }

    #[test]
    fn test_single_match_writes_one_named_file() {
        let mut h = harness(vec![FixtureRow::new("SUP7", 6, "INV-001", b"%PDF-1.4 body")]);
        h.retriever.initialize().unwrap();

        let paths = h
            .retriever
            .retrieve_pdfs(&RetrievalOptions::invoices(["INV-001", "INV-002"], None))
            .unwrap();

        assert_eq!(paths, vec![PathBuf::from("out/SUP7-6-INV-001.pdf")]);
        let files = h.files.borrow();
        assert_eq!(files.len(), 1);
        assert_eq!(files["SUP7-6-INV-001.pdf"], b"%PDF-1.4 body");
    }

    #[test]
    fn test_attachments_sharing_a_name_get_numbered_suffixes() {
        let mut h = harness(vec![
            FixtureRow::new("SUP7", 6, "INV-001", b"%PDF-first"),
            FixtureRow::new("SUP7", 6, "INV-001", b"%PDF-second"),
        ]);
        h.retriever.initialize().unwrap();

        let paths = h
            .retriever
            .retrieve_pdfs(&RetrievalOptions::invoices(["INV-001"], None))
            .unwrap();

        assert_eq!(
            paths,
            vec![
                PathBuf::from("out/SUP7-6-INV-001.pdf"),
                PathBuf::from("out/SUP7-6-INV-001-2.pdf")
            ]
        );
        let files = h.files.borrow();
        assert_eq!(files.len(), 2);
        assert_eq!(files["SUP7-6-INV-001.pdf"], b"%PDF-first");
        assert_eq!(files["SUP7-6-INV-001-2.pdf"], b"%PDF-second");
    }

    #[test]
    fn test_invalid_attachment_does_not_take_a_name() {
        let mut h = harness(vec![
            FixtureRow::new("SUP7", 6, "INV-001", b"garbage"),
            FixtureRow::new("SUP7", 6, "INV-001", b"%PDF-good"),
        ]);
        h.retriever.initialize().unwrap();

        let paths = h
            .retriever
            .retrieve_pdfs(&RetrievalOptions::invoices(["INV-001"], None))
            .unwrap();

        assert_eq!(paths, vec![PathBuf::from("out/SUP7-6-INV-001.pdf")]);
        assert_eq!(h.files.borrow()["SUP7-6-INV-001.pdf"], b"%PDF-good");
    }

    #[test]
    fn test_table_mode_repeated_ids_get_numbered_suffixes() {
        fn first() -> ResultRow {
            ResultRow::new()
                .with(ROW_ID, ColumnValue::Text("7".into()))
                .with(BLOB_CONTENT, ColumnValue::Bytes(b"%PDF-a".to_vec()))
        }
        fn second() -> ResultRow {
            ResultRow::new()
                .with(ROW_ID, ColumnValue::Text("7".into()))
                .with(BLOB_CONTENT, ColumnValue::Bytes(b"%PDF-b".to_vec()))
        }
        let mut h = harness_with(Vec::new(), vec![first, second], None, Vec::new());
        h.retriever.initialize().unwrap();

        let selection = TableSelection {
            table_name: "DOCS".to_string(),
            blob_column: "PAYLOAD".to_string(),
            id_column: Some("DOC_ID".to_string()),
            ..Default::default()
        };
        let paths = h.retriever.retrieve_pdfs(&RetrievalOptions::Table(selection)).unwrap();

        assert_eq!(
            paths,
            vec![PathBuf::from("out/pdf_7.pdf"), PathBuf::from("out/pdf_7-2.pdf")]
        );
        assert_eq!(h.files.borrow().len(), 2);
    }

    #[test]
    fn test_long_code_list_runs_one_statement_per_chunk() {
        let codes: Vec<String> = (0..1500).map(|i| format!("INV-{i:04}")).collect();
        let mut h = harness(vec![
            FixtureRow::new("A", 1, "INV-0003", b"%PDF-a"),
            FixtureRow::new("B", 2, "INV-1499", b"%PDF-b"),
        ]);
        h.retriever.initialize().unwrap();

        let paths = h
            .retriever
            .retrieve_pdfs(&RetrievalOptions::invoices(codes, None))
            .unwrap();

        assert_eq!(
            paths,
            vec![PathBuf::from("out/A-1-INV-0003.pdf"), PathBuf::from("out/B-2-INV-1499.pdf")]
        );
        let log = h.log.borrow();
        assert_eq!(log.statements.len(), 2);
        assert_eq!(log.statements[0].params().len(), 1000);
        assert_eq!(log.statements[1].params().len(), 500);
    }

    #[test]
    fn test_no_matching_codes_writes_nothing() {
        let mut h = harness(vec![FixtureRow::new("SUP7", 6, "INV-001", b"%PDF-1.4")]);
        h.retriever.initialize().unwrap();

        let paths = h
            .retriever
            .retrieve_pdfs(&RetrievalOptions::invoices(["NOPE"], None))
            .unwrap();

        assert!(paths.is_empty());
        assert!(h.files.borrow().is_empty());
    }

    #[test]
    fn test_empty_code_list_skips_query() {
        let mut h = harness(Vec::new());
        h.retriever.initialize().unwrap();

        let paths = h
            .retriever
            .retrieve_pdfs(&RetrievalOptions::invoices(Vec::<String>::new(), None))
            .unwrap();

        assert!(paths.is_empty());
        assert!(h.log.borrow().statements.is_empty());
    }

    #[test]
    fn test_invalid_pdf_is_skipped_and_batch_continues() {
        let mut h = harness(vec![
            FixtureRow::new("A", 1, "INV-1", b"not a pdf"),
            FixtureRow::new("B", 2, "INV-2", b"%PDF-1.7"),
        ]);
        h.retriever.initialize().unwrap();

        let paths = h
            .retriever
            .retrieve_pdfs(&RetrievalOptions::invoices(["INV-1", "INV-2"], None))
            .unwrap();

        assert_eq!(paths, vec![PathBuf::from("out/B-2-INV-2.pdf")]);
        assert!(!h.files.borrow().contains_key("A-1-INV-1.pdf"));
    }

    #[test]
    fn test_invalid_pdf_is_warned_about_once() {
        let mut h = harness(vec![FixtureRow::new("A", 1, "INV-1", b"not a pdf")]);
        h.retriever.initialize().unwrap();

        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&warnings)));
        let paths = tracing::subscriber::with_default(subscriber, || {
            h.retriever
                .retrieve_pdfs(&RetrievalOptions::invoices(["INV-1"], None))
                .unwrap()
        });

        assert!(paths.is_empty());
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_description_filter_excludes_other_attachments() {
        let mut copy = FixtureRow::new("SUP7", 6, "INV-001", b"%PDF-copy");
        copy.description = "Copy";
        let mut original = FixtureRow::new("SUP7", 7, "INV-001", b"%PDF-original");
        original.as_lob = true;
        let mut h = harness(vec![copy, original]);
        h.retriever.initialize().unwrap();

        let paths = h
            .retriever
            .retrieve_pdfs(&RetrievalOptions::invoices(
                ["INV-001"],
                Some("Original".to_string()),
            ))
            .unwrap();

        assert_eq!(paths, vec![PathBuf::from("out/SUP7-7-INV-001.pdf")]);
        assert_eq!(h.files.borrow()["SUP7-7-INV-001.pdf"], b"%PDF-original");

        let log = h.log.borrow();
        let statement = &log.statements[0];
        assert!(statement.sql().contains("AND ia.DESCRIPTION = :2"));
        assert_eq!(statement.params()[1], SqlParam::Text("Original".to_string()));
    }

    #[test]
    fn test_write_failure_is_skipped_in_batch() {
        let mut h = harness_with(
            vec![
                FixtureRow::new("A", 1, "INV-1", b"%PDF-a"),
                FixtureRow::new("B", 2, "INV-2", b"%PDF-b"),
            ],
            Vec::new(),
            None,
            vec!["A-1-INV-1"],
        );
        h.retriever.initialize().unwrap();

        let paths = h
            .retriever
            .retrieve_pdfs(&RetrievalOptions::invoices(["INV-1", "INV-2"], None))
            .unwrap();

        assert_eq!(paths, vec![PathBuf::from("out/B-2-INV-2.pdf")]);
    }

    #[test]
    fn test_query_failure_propagates() {
        let mut h = harness_with(Vec::new(), Vec::new(), Some(DbErrorKind::MissingObject), Vec::new());
        h.retriever.initialize().unwrap();

        let result = h.retriever.retrieve_pdfs(&RetrievalOptions::invoices(["X"], None));

        match result {
            Err(ExtractorError::Database { kind, .. }) => assert_eq!(kind, DbErrorKind::MissingObject),
            other => panic!("expected database error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_blob_row_is_dropped() {
        fn text_blob() -> ResultRow {
            ResultRow::new()
                .with(ROW_ID, ColumnValue::Integer(1))
                .with(BLOB_CONTENT, ColumnValue::Text("oops".into()))
        }
        fn good_blob() -> ResultRow {
            ResultRow::new()
                .with(ROW_ID, ColumnValue::Integer(2))
                .with(BLOB_CONTENT, ColumnValue::Bytes(b"%PDF-1.5".to_vec()))
        }
        let mut h = harness_with(Vec::new(), vec![text_blob, good_blob], None, Vec::new());
        h.retriever.initialize().unwrap();

        let selection = TableSelection {
            table_name: "DOCS".to_string(),
            blob_column: "PAYLOAD".to_string(),
            id_column: Some("ID".to_string()),
            filename_prefix: Some("extracted_pdf".to_string()),
            ..Default::default()
        };
        let paths = h.retriever.retrieve_pdfs(&RetrievalOptions::Table(selection)).unwrap();

        assert_eq!(paths, vec![PathBuf::from("out/extracted_pdf_2.pdf")]);
    }

    #[test]
    fn test_table_mode_positional_names_without_id() {
        fn first() -> ResultRow {
            ResultRow::new().with(BLOB_CONTENT, ColumnValue::Bytes(b"%PDF-a".to_vec()))
        }
        fn second() -> ResultRow {
            ResultRow::new().with(BLOB_CONTENT, ColumnValue::Bytes(b"%PDF-b".to_vec()))
        }
        let mut h = harness_with(Vec::new(), vec![first, second], None, Vec::new());
        h.retriever.initialize().unwrap();

        let selection = TableSelection {
            table_name: "DOCS".to_string(),
            blob_column: "PAYLOAD".to_string(),
            ..Default::default()
        };
        let paths = h.retriever.retrieve_pdfs(&RetrievalOptions::Table(selection)).unwrap();

        assert_eq!(
            paths,
            vec![PathBuf::from("out/pdf_1.pdf"), PathBuf::from("out/pdf_2.pdf")]
        );
    }

    #[test]
    fn test_missing_column_fails_the_call() {
        fn no_blob() -> ResultRow {
            ResultRow::new().with(ROW_ID, ColumnValue::Integer(1))
        }
        let mut h = harness_with(Vec::new(), vec![no_blob], None, Vec::new());
        h.retriever.initialize().unwrap();

        let selection = TableSelection {
            table_name: "DOCS".to_string(),
            blob_column: "PAYLOAD".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            h.retriever.retrieve_pdfs(&RetrievalOptions::Table(selection)),
            Err(ExtractorError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut h = harness(Vec::new());
        h.retriever.close().unwrap();
        h.retriever.initialize().unwrap();
        h.retriever.close().unwrap();
        h.retriever.close().unwrap();
        assert_eq!(h.log.borrow().closed, 1);

        let result = h.retriever.retrieve_pdfs(&RetrievalOptions::invoices(["X"], None));
        assert!(matches!(result, Err(ExtractorError::NotInitialized)));
    }

    #[test]
    fn test_check_connection_runs_trivial_query() {
        let mut h = harness(Vec::new());
        assert!(matches!(
            h.retriever.check_connection(),
            Err(ExtractorError::NotInitialized)
        ));
        h.retriever.initialize().unwrap();
        h.retriever.check_connection().unwrap();
        assert_eq!(h.log.borrow().statements[0].sql(), "SELECT 1 AS OK FROM DUAL");
    }
}
