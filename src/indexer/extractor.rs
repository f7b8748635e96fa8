use std::path::Path;

use anyhow::{Context, Result};

use super::walker::DocumentFormat;

pub fn extract_text(path: &Path, format: DocumentFormat) -> Result<String> {
    match format {
        DocumentFormat::PlainText => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read text file: {}", path.display())),
        DocumentFormat::Pdf => pdf_extract::extract_text(path)
            .with_context(|| format!("Failed to extract PDF text: {}", path.display())),
    }
}

/// Extract from an in-memory upload.
pub fn extract_bytes(bytes: &[u8], format: DocumentFormat) -> Result<String> {
    match format {
        DocumentFormat::PlainText => {
            String::from_utf8(bytes.to_vec()).context("Text upload is not valid UTF-8")
        }
        DocumentFormat::Pdf => {
            pdf_extract::extract_text_from_mem(bytes).context("Failed to extract PDF text")
        }
    }
}
