//! PDF inspection for uploaded files.

use crate::error::{AppError, Result};
use lopdf::Document;
use std::path::Path;

/// Every PDF starts with this marker.
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Check the leading bytes of a file for the PDF marker.
pub fn has_pdf_magic(head: &[u8]) -> bool {
    head.starts_with(PDF_MAGIC)
}

/// Count pages by parsing the document.
pub fn page_count(path: &Path) -> Result<i64> {
    let doc = Document::load(path).map_err(|e| AppError::Internal(format!("PDF error: {}", e)))?;
    Ok(doc.get_pages().len() as i64)
}
