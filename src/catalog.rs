//! Catalog service: listing, book files and reading progress.

use crate::config::CatalogConfig;
use crate::db::{
    Book, BookMetadata, BookQuery, BookUpdate, Database, NewBook, ProgressUpdate, ReadingSession,
    ReadingStats,
};
use crate::error::{AppError, Result};
use crate::pdf;
use crate::uploads::{StoredFile, UploadKind, UploadStore};
use crate::validation;
use chrono::Datelike;
use serde::{Deserialize, Serialize};

/// Raw listing parameters from the query string.
///
/// Kept as strings so malformed numbers fall back to defaults instead of
/// rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    /// 1-based page number.
    pub page: Option<String>,
    /// Page size.
    pub limit: Option<String>,
    /// Free-text search.
    pub search: Option<String>,
    /// Genre filter.
    pub genre: Option<String>,
}

/// Page metadata returned with every listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Current page (1-based).
    pub page: u32,
    /// Page size.
    pub limit: u32,
    /// Matching books across all pages.
    pub total: u64,
    /// `ceil(total / limit)`.
    pub total_pages: u64,
    /// A later page exists.
    pub has_next: bool,
    /// An earlier page exists.
    pub has_prev: bool,
}

impl Pagination {
    /// Compute page metadata. `limit` must be non-zero.
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = total.div_ceil(u64::from(limit.max(1)));
        Self {
            page,
            limit,
            total,
            total_pages,
            has_next: u64::from(page) < total_pages,
            has_prev: page > 1,
        }
    }
}

/// One page of the catalog.
#[derive(Debug, Serialize)]
pub struct BookPage {
    /// Books on this page.
    pub items: Vec<Book>,
    /// Page metadata.
    pub pagination: Pagination,
}

/// A book with the caller's reading session, if any.
#[derive(Debug, Serialize)]
pub struct BookDetail {
    /// The book.
    pub book: Book,
    /// Caller's session; `null` when anonymous or never opened.
    pub session: Option<ReadingSession>,
}

/// An opened PDF ready to be streamed.
pub struct PdfFile {
    /// Book the file belongs to.
    pub book: Book,
    /// Open handle.
    pub file: tokio::fs::File,
    /// Size in bytes.
    pub len: u64,
}

/// Catalog service.
pub struct CatalogService {
    db: Database,
    uploads: UploadStore,
    default_limit: u32,
    max_limit: u32,
}

impl CatalogService {
    /// Create a new catalog service.
    pub fn new(db: Database, uploads: UploadStore, config: &CatalogConfig) -> Self {
        Self {
            db,
            uploads,
            default_limit: config.default_limit.max(1),
            max_limit: config.max_limit.max(1),
        }
    }

    /// Upload store backing the catalog.
    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    /// List books newest first, filtered and paginated.
    pub fn list_books(&self, params: &ListParams) -> Result<BookPage> {
        let page = parse_positive(params.page.as_deref()).unwrap_or(1);
        let limit = parse_positive(params.limit.as_deref())
            .unwrap_or(self.default_limit)
            .min(self.max_limit);

        let query = BookQuery {
            search: non_empty(params.search.as_deref()),
            genre: non_empty(params.genre.as_deref()),
            limit,
            offset: u64::from(page - 1) * u64::from(limit),
        };

        let (items, total) = self.db.list_books(&query)?;

        Ok(BookPage {
            items,
            pagination: Pagination::new(page, limit, total),
        })
    }

    /// Get a book, with the viewer's session when a viewer is known.
    pub fn get_book(&self, id: i64, viewer: Option<i64>) -> Result<BookDetail> {
        let book = self.find_book(id)?;
        let session = match viewer {
            Some(user_id) => self.db.get_session(user_id, id)?,
            None => None,
        };
        Ok(BookDetail { book, session })
    }

    /// Persist a new book around already-stored upload files.
    ///
    /// On any failure the uploaded files are removed again.
    pub async fn create_book(
        &self,
        mut metadata: BookMetadata,
        pdf_file: Option<StoredFile>,
        cover: Option<StoredFile>,
    ) -> Result<Book> {
        let Some(pdf_file) = pdf_file else {
            if let Some(cover) = &cover {
                self.uploads.discard(cover).await;
            }
            return Err(AppError::MissingFile);
        };

        let result = async {
            validation::validate_book(&metadata, current_year())?;

            if metadata.page_count.is_none() {
                metadata.page_count = inspect_page_count(&pdf_file).await;
            }

            let new_book = NewBook {
                metadata,
                pdf_path: pdf_file.file_name.clone(),
                file_size: i64::try_from(pdf_file.size).ok(),
                cover_image: cover.as_ref().map(|c| c.file_name.clone()),
            };

            self.db.create_book(&new_book)
        }
        .await;

        match result {
            Ok(book) => {
                tracing::info!(book_id = book.id, title = %book.title, "Book created");
                Ok(book)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    file = %pdf_file.file_name,
                    "Book creation failed, removing upload"
                );
                self.uploads.discard(&pdf_file).await;
                if let Some(cover) = &cover {
                    self.uploads.discard(cover).await;
                }
                Err(e)
            }
        }
    }

    /// Patch a book's metadata.
    pub fn update_book(&self, id: i64, update: BookUpdate) -> Result<Book> {
        let existing = self.find_book(id)?;
        let mut metadata = BookMetadata::from(&existing);
        update.apply_to(&mut metadata);
        validation::validate_book(&metadata, current_year())?;

        self.db
            .update_book(id, &metadata)?
            .ok_or_else(|| not_found(id))
    }

    /// Delete a book, its sessions and its files.
    pub async fn delete_book(&self, id: i64) -> Result<()> {
        let book = self.find_book(id)?;
        if !self.db.delete_book(id)? {
            return Err(not_found(id));
        }
        self.uploads.remove_book_files(&book).await;
        tracing::info!(book_id = id, "Book deleted");
        Ok(())
    }

    /// Open a book's PDF for streaming.
    pub async fn open_pdf(&self, id: i64) -> Result<PdfFile> {
        let book = self.find_book(id)?;
        if book.pdf_path.is_empty() {
            return Err(AppError::NotFound(
                "PDF not available for this book".to_string(),
            ));
        }

        let path = self.uploads.path_for(UploadKind::Pdf, &book.pdf_path);
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(book_id = id, path = %path.display(), "PDF missing on disk");
                return Err(AppError::NotFound("PDF file not found".to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata().await?.len();

        Ok(PdfFile { book, file, len })
    }

    /// Record reading progress for `(user_id, book_id)`.
    pub fn upsert_progress(
        &self,
        user_id: i64,
        book_id: i64,
        update: ProgressUpdate,
    ) -> Result<ReadingSession> {
        self.find_book(book_id)?;
        let session = self.db.upsert_session(user_id, book_id, &update)?;
        tracing::debug!(
            user_id,
            book_id,
            last_page = session.last_page,
            progress = session.progress,
            "Reading progress saved"
        );
        Ok(session)
    }

    /// Aggregate a user's reading progress.
    pub fn reading_stats(&self, user_id: i64) -> Result<ReadingStats> {
        self.db.get_reading_stats(user_id)
    }

    /// Distinct genres, alphabetical.
    pub fn list_genres(&self) -> Result<Vec<String>> {
        self.db.list_genres()
    }

    /// Insert a few well-known titles for demos.
    ///
    /// They reference PDF names that are not on disk until someone places
    /// them under `pdfs/`.
    pub fn create_samples(&self) -> Result<Vec<Book>> {
        sample_books()
            .into_iter()
            .map(|book| self.db.create_book(&book))
            .collect()
    }

    fn find_book(&self, id: i64) -> Result<Book> {
        self.db.get_book(id)?.ok_or_else(|| not_found(id))
    }
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Book not found: {}", id))
}

fn current_year() -> i32 {
    chrono::Utc::now().year()
}

fn parse_positive(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .filter(|n| *n >= 1)
}

fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Page count from the PDF itself; `None` when it cannot be parsed.
async fn inspect_page_count(file: &StoredFile) -> Option<i64> {
    let path = file.path.clone();
    match tokio::task::spawn_blocking(move || pdf::page_count(&path)).await {
        Ok(Ok(pages)) if pages > 0 => Some(pages),
        Ok(Ok(_)) => None,
        Ok(Err(e)) => {
            tracing::debug!(file = %file.file_name, error = %e, "Could not read page count");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "Page count task failed");
            None
        }
    }
}

fn sample_books() -> Vec<NewBook> {
    let sample = |title: &str,
                  author: &str,
                  year: i32,
                  description: &str,
                  genre: &str,
                  publisher: &str,
                  isbn: &str,
                  pages: i64,
                  cover: &str,
                  pdf: &str| NewBook {
        metadata: BookMetadata {
            title: title.to_string(),
            author: author.to_string(),
            year: Some(year),
            description: Some(description.to_string()),
            genre: Some(genre.to_string()),
            publisher: Some(publisher.to_string()),
            isbn: Some(isbn.to_string()),
            page_count: Some(pages),
            language: Some("en".to_string()),
        },
        pdf_path: pdf.to_string(),
        file_size: None,
        cover_image: Some(cover.to_string()),
    };

    vec![
        sample(
            "The Great Gatsby",
            "F. Scott Fitzgerald",
            1925,
            "A classic novel of the Jazz Age, telling the story of the mysterious millionaire Jay Gatsby and his obsession with the beautiful Daisy Buchanan.",
            "Classic",
            "Scribner",
            "9780743273565",
            180,
            "great-gatsby.jpg",
            "sample1.pdf",
        ),
        sample(
            "To Kill a Mockingbird",
            "Harper Lee",
            1960,
            "A gripping story of racial injustice and childhood innocence in the American South.",
            "Fiction",
            "J.B. Lippincott & Co.",
            "9780061120084",
            281,
            "mockingbird.jpg",
            "sample2.pdf",
        ),
        sample(
            "1984",
            "George Orwell",
            1949,
            "A dystopian social science fiction novel that examines the consequences of totalitarianism.",
            "Science Fiction",
            "Secker & Warburg",
            "9780451524935",
            328,
            "1984.jpg",
            "sample3.pdf",
        ),
    ]
}
