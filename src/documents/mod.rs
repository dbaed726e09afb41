//! Text extraction from uploaded documents.
//!
//! Dispatch is on the lower-cased file extension. Unknown extensions yield
//! an empty string, which ingestion reports as an empty document.

mod csv;
mod office;

use std::path::Path;

use crate::core::errors::ApiError;

pub fn extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Extracts the plain text of a document.
///
/// CPU-bound; async callers should run it on the blocking pool.
pub fn parse_document(filename: &str, bytes: &[u8]) -> Result<String, ApiError> {
    let corrupt = |reason: String| ApiError::BadRequest(format!("could not read {}: {}", filename, reason));

    match extension(filename).as_str() {
        "pdf" => pdf_text(bytes).map_err(corrupt),
        "docx" => office::docx_text(bytes).map_err(corrupt),
        "pptx" => office::pptx_text(bytes).map_err(corrupt),
        "csv" => Ok(csv::render(&String::from_utf8_lossy(bytes))),
        "txt" | "md" => Ok(String::from_utf8_lossy(bytes).into_owned()),
        other => {
            tracing::warn!("Unsupported file type '{}' for {}", other, filename);
            Ok(String::new())
        }
    }
}

fn pdf_text(bytes: &[u8]) -> Result<String, String> {
    // The extractor panics on some malformed inputs.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err("malformed PDF".to_string()),
    }
}
