use pdf_core::error::{ExtractorError, Result};
use pdf_core::ports::PdfStore;
use pdf_core::utils::with_pdf_extension;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Writes PDF buffers into a directory on the local filesystem
pub struct PdfFileWriterAdapter {
    output_dir: PathBuf,
}

impl PdfFileWriterAdapter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl PdfStore for PdfFileWriterAdapter {
    fn ensure_output_directory(&self) -> Result<()> {
        if self.output_dir.is_dir() {
            return Ok(());
        }
        // create_dir_all succeeds when another caller created it in between
        fs::create_dir_all(&self.output_dir)?;
        info!(dir = %self.output_dir.display(), "created output directory");
        Ok(())
    }

    fn save(&self, buffer: &[u8], base_name: &str) -> Result<PathBuf> {
        self.ensure_output_directory()?;

        let file_path = self.output_dir.join(with_pdf_extension(base_name));
        match fs::write(&file_path, buffer) {
            Ok(()) => {
                debug!(path = %file_path.display(), bytes = buffer.len(), "PDF saved");
                Ok(file_path)
            }
            Err(source) => {
                error!(path = %file_path.display(), error = %source, "error saving PDF file");
                Err(ExtractorError::Write {
                    path: file_path,
                    source,
                })
            }
        }
    }
}
