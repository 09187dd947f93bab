//! Upload storage: `covers/` and `pdfs/` under a root directory.

use crate::config::UploadsConfig;
use crate::db::Book;
use crate::error::{AppError, Result};
use crate::pdf;
use axum::extract::multipart::Field;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Leading bytes kept for format sniffing.
const HEAD_LEN: usize = 16;

/// Kind of uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    /// Book PDF.
    Pdf,
    /// Cover image.
    Cover,
}

impl UploadKind {
    fn dir_name(self) -> &'static str {
        match self {
            UploadKind::Pdf => "pdfs",
            UploadKind::Cover => "covers",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            UploadKind::Pdf => "book",
            UploadKind::Cover => "cover",
        }
    }
}

/// A file written to the upload tree.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Generated file name (what the database stores).
    pub file_name: String,
    /// Absolute or root-relative location on disk.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
}

/// On-disk upload store.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
    max_pdf_bytes: u64,
    max_cover_bytes: u64,
}

impl UploadStore {
    /// Create a store from configuration.
    pub fn new(config: &UploadsConfig) -> Self {
        Self {
            root: config.dir.clone(),
            max_pdf_bytes: config.max_pdf_bytes,
            max_cover_bytes: config.max_cover_bytes,
        }
    }

    /// Create `covers/` and `pdfs/` if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        for kind in [UploadKind::Pdf, UploadKind::Cover] {
            std::fs::create_dir_all(self.root.join(kind.dir_name()))?;
        }
        Ok(())
    }

    /// Root of the upload tree (served under `/uploads`).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of a stored file.
    pub fn path_for(&self, kind: UploadKind, file_name: &str) -> PathBuf {
        self.root.join(kind.dir_name()).join(file_name)
    }

    fn max_bytes(&self, kind: UploadKind) -> u64 {
        match kind {
            UploadKind::Pdf => self.max_pdf_bytes,
            UploadKind::Cover => self.max_cover_bytes,
        }
    }

    /// Stream a multipart field to disk, enforcing type and size limits.
    ///
    /// The partially written file is removed on any failure.
    pub async fn save_field(&self, kind: UploadKind, mut field: Field<'_>) -> Result<StoredFile> {
        let extension = accepted_extension(kind, field.content_type(), field.file_name())?;
        let file_name = generated_name(kind, extension);
        let path = self.path_for(kind, &file_name);
        let max_size = self.max_bytes(kind);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let result = async {
            let mut file = tokio::fs::File::create(&path).await?;
            let mut head = Vec::with_capacity(HEAD_LEN);
            let mut total_size: u64 = 0;

            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|e| AppError::Upload(format!("Upload read error: {e}")))?
            {
                total_size += chunk.len() as u64;
                if total_size > max_size {
                    return Err(AppError::Upload(format!(
                        "File too large: maximum is {} for {}",
                        size_label(max_size),
                        kind.dir_name()
                    )));
                }
                if head.len() < HEAD_LEN {
                    let take = (HEAD_LEN - head.len()).min(chunk.len());
                    head.extend_from_slice(&chunk[..take]);
                }
                file.write_all(&chunk).await?;
            }

            file.flush().await?;
            check_signature(kind, extension, &head)?;
            Ok(total_size)
        }
        .await;

        match result {
            Ok(size) => {
                tracing::debug!(file = %file_name, size, "Stored upload");
                Ok(StoredFile {
                    file_name,
                    path,
                    size,
                })
            }
            Err(e) => {
                // Best effort.
                let _ = tokio::fs::remove_file(&path).await;
                Err(e)
            }
        }
    }

    /// Remove a stored file, logging failures.
    pub async fn discard(&self, file: &StoredFile) {
        remove_logged(&file.path).await;
    }

    /// Remove the PDF and cover referenced by a book.
    pub async fn remove_book_files(&self, book: &Book) {
        if !book.pdf_path.is_empty() {
            remove_logged(&self.path_for(UploadKind::Pdf, &book.pdf_path)).await;
        }
        if let Some(cover) = &book.cover_image {
            remove_logged(&self.path_for(UploadKind::Cover, cover)).await;
        }
    }
}

async fn remove_logged(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed upload"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove upload"),
    }
}

/// Decide the stored extension from the declared type and name.
fn accepted_extension(
    kind: UploadKind,
    content_type: Option<&str>,
    file_name: Option<&str>,
) -> Result<&'static str> {
    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
    let ext = file_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match kind {
        UploadKind::Pdf => {
            if content_type == "application/pdf" || ext.as_deref() == Some("pdf") {
                Ok("pdf")
            } else {
                Err(AppError::Upload(
                    "Unsupported file type: only PDF files are accepted".to_string(),
                ))
            }
        }
        UploadKind::Cover => match (content_type.as_str(), ext.as_deref()) {
            ("image/jpeg", _) | (_, Some("jpg" | "jpeg")) => Ok("jpg"),
            ("image/png", _) | (_, Some("png")) => Ok("png"),
            ("image/webp", _) | (_, Some("webp")) => Ok("webp"),
            _ => Err(AppError::Upload(
                "Unsupported file type: only JPEG, PNG and WebP images are accepted".to_string(),
            )),
        },
    }
}

/// Check that the content matches the accepted type.
fn check_signature(kind: UploadKind, extension: &str, head: &[u8]) -> Result<()> {
    let ok = match kind {
        UploadKind::Pdf => pdf::has_pdf_magic(head),
        UploadKind::Cover => matches!(
            (image::guess_format(head), extension),
            (Ok(ImageFormat::Jpeg), "jpg")
                | (Ok(ImageFormat::Png), "png")
                | (Ok(ImageFormat::WebP), "webp")
        ),
    };

    if ok {
        Ok(())
    } else {
        Err(AppError::Upload(format!(
            "File content does not match its declared type ({})",
            extension
        )))
    }
}

fn size_label(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes >= MIB {
        format!("{} MB", bytes / MIB)
    } else {
        format!("{} bytes", bytes)
    }
}

/// `<prefix>-<uuid>.<ext>`
fn generated_name(kind: UploadKind, extension: &str) -> String {
    format!("{}-{}.{}", kind.prefix(), uuid::Uuid::new_v4(), extension)
}
