mod input;

use clap::Parser;
use oracle_adapter::OraclePoolFactory;
use pdf_core::ports::{PdfStore, PoolFactory};
use pdf_core::{AppConfig, ExtractorError, PdfRetriever, RetrievalOptions, TableSelection};
use pdf_file_adapter::PdfFileWriterAdapter;
use std::io::{self, Write};
use std::panic;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI tool to extract invoice PDF attachments from Oracle and save them as files
#[derive(Parser, Debug)]
#[command(name = "pdf-retriever")]
#[command(about = "Extracts PDF attachments of invoices from an Oracle database into local files")]
struct Cli {
    /// JSON file holding an array of supplier invoice numbers
    #[arg(required_unless_present_any = ["table", "check_connection"])]
    codes_file: Option<PathBuf>,

    /// Only fetch attachments with exactly this description
    description: Option<String>,

    /// Output directory, overrides PDF_OUTPUT_DIR
    #[arg(short = 'o', long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// Extract every BLOB of this table instead of matching invoice codes
    #[arg(long, requires = "blob_column", conflicts_with = "codes_file")]
    table: Option<String>,

    /// BLOB column to read in table mode
    #[arg(long = "blob-column", requires = "table")]
    blob_column: Option<String>,

    /// Column used for fallback file names in table mode
    #[arg(long = "id-column", requires = "table")]
    id_column: Option<String>,

    /// Raw SQL predicate for table mode (trusted input)
    #[arg(long = "where", requires = "table")]
    where_clause: Option<String>,

    /// Prefix for fallback file names in table mode
    #[arg(long, requires = "table")]
    prefix: Option<String>,

    /// Keep only the most recent attachment per supplier in table mode
    #[arg(long = "latest-per-supplier", requires = "table")]
    latest_per_supplier: bool,

    /// Only test that the database is reachable
    #[arg(long = "check-connection")]
    check_connection: bool,
}

fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    // Usage errors exit with 1 rather than clap's default 2.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    // A panic is a fault like any other and exits with 1, not the runtime's 101.
    match panic::catch_unwind(|| run(&cli)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(error = %format!("{:#}", e), "PDF retrieval failed");
            if let Some(hint) = e.downcast_ref::<ExtractorError>().and_then(ExtractorError::hint) {
                eprintln!("Hint: {}", hint);
            }
            std::process::exit(1);
        }
        Err(_) => {
            error!("PDF retrieval aborted by an internal error");
            std::process::exit(1);
        }
    }
}

/// `RUST_LOG` filters, `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pdf_core=info,oracle_adapter=info,pdf_file_adapter=info,pdf_retriever=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let options = if cli.check_connection {
        None
    } else {
        Some(retrieval_options(cli)?)
    };

    let config = AppConfig::from_env()?;
    let output_dir = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| config.pdf_output_dir.clone());

    // Instantiate concrete implementations of secondary adapters
    let pool_factory: Box<dyn PoolFactory> = Box::new(OraclePoolFactory::new(config.database));
    let store: Box<dyn PdfStore> = Box::new(PdfFileWriterAdapter::new(&output_dir));

    let mut retriever = PdfRetriever::new(pool_factory, store);
    let outcome = execute(&mut retriever, options.as_ref());

    // The pool is released on both paths.
    match retriever.close() {
        Ok(()) => info!("database connection closed"),
        Err(e) => error!(error = %e, "failed to close database connection"),
    }
    outcome
}

fn execute(retriever: &mut PdfRetriever, options: Option<&RetrievalOptions>) -> anyhow::Result<()> {
    retriever.initialize()?;
    info!("database connection established");

    let Some(options) = options else {
        retriever.check_connection()?;
        report(|out| writeln!(out, "Database connection successful"))?;
        return Ok(());
    };

    let saved = retriever.retrieve_pdfs(options)?;
    report(|out| write_summary(out, &saved))?;
    Ok(())
}

/// Writes to a locked stdout. A closed pipe (`| head`) is not an error.
fn report(write: impl FnOnce(&mut dyn Write) -> io::Result<()>) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    ignore_broken_pipe(write(&mut out).and_then(|()| out.flush()))
}

fn ignore_broken_pipe(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

fn write_summary(out: &mut dyn Write, saved: &[PathBuf]) -> io::Result<()> {
    if saved.is_empty() {
        return writeln!(out, "No PDF files were found or saved");
    }
    writeln!(out, "Successfully saved {} PDF file(s):", saved.len())?;
    for (i, path) in saved.iter().enumerate() {
        writeln!(out, "   {}. {}", i + 1, path.display())?;
    }
    Ok(())
}

fn retrieval_options(cli: &Cli) -> anyhow::Result<RetrievalOptions> {
    if let Some(table) = &cli.table {
        return Ok(RetrievalOptions::Table(TableSelection {
            table_name: table.clone(),
            blob_column: cli.blob_column.clone().unwrap_or_default(),
            id_column: cli.id_column.clone(),
            where_clause: cli.where_clause.clone(),
            filename_prefix: cli.prefix.clone(),
            latest_per_supplier: cli.latest_per_supplier,
        }));
    }

    let Some(path) = &cli.codes_file else {
        anyhow::bail!("an invoice codes file is required");
    };
    let codes = input::read_invoice_codes(path)?;
    info!(count = codes.len(), file = %path.display(), "loaded invoice codes");
    Ok(RetrievalOptions::invoices(codes, cli.description.clone()))
}
