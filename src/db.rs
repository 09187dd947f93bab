mod schema;

pub use schema::Database;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user ID.
    pub id: i64,
    /// Login email (unique).
    pub email: String,
    /// Argon2 password hash.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    /// Account creation timestamp.
    pub created_at: i64,
    /// Last login timestamp.
    pub last_login: Option<i64>,
    /// Soft-deactivation flag.
    pub is_active: bool,
}

/// Catalog entry. Cover and PDF are file names inside the upload tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    /// Book ID.
    pub id: i64,
    /// Book title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Publication year.
    pub year: Option<i32>,
    /// Book description.
    pub description: Option<String>,
    /// Genre label (free text).
    pub genre: Option<String>,
    /// Publisher.
    pub publisher: Option<String>,
    /// ISBN.
    pub isbn: Option<String>,
    /// Page count.
    pub page_count: Option<i64>,
    /// Stored cover file name (under `covers/`).
    pub cover_image: Option<String>,
    /// Stored PDF file name (under `pdfs/`).
    pub pdf_path: String,
    /// PDF size in bytes.
    pub file_size: Option<i64>,
    /// Language code.
    pub language: Option<String>,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// Descriptive fields of a book, as supplied by clients.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookMetadata {
    /// Book title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Publication year.
    pub year: Option<i32>,
    /// Description.
    pub description: Option<String>,
    /// Genre.
    pub genre: Option<String>,
    /// Publisher.
    pub publisher: Option<String>,
    /// ISBN.
    pub isbn: Option<String>,
    /// Page count.
    pub page_count: Option<i64>,
    /// Language code.
    pub language: Option<String>,
}

impl From<&Book> for BookMetadata {
    fn from(book: &Book) -> Self {
        Self {
            title: book.title.clone(),
            author: book.author.clone(),
            year: book.year,
            description: book.description.clone(),
            genre: book.genre.clone(),
            publisher: book.publisher.clone(),
            isbn: book.isbn.clone(),
            page_count: book.page_count,
            language: book.language.clone(),
        }
    }
}

/// Partial metadata update; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookUpdate {
    /// New title.
    pub title: Option<String>,
    /// New author.
    pub author: Option<String>,
    /// New publication year.
    pub year: Option<i32>,
    /// New description.
    pub description: Option<String>,
    /// New genre.
    pub genre: Option<String>,
    /// New publisher.
    pub publisher: Option<String>,
    /// New ISBN.
    pub isbn: Option<String>,
    /// New page count.
    #[serde(alias = "page_count")]
    pub page_count: Option<i64>,
    /// New language code.
    pub language: Option<String>,
}

impl BookUpdate {
    /// Merge this patch into existing metadata.
    pub fn apply_to(self, meta: &mut BookMetadata) {
        if let Some(title) = self.title {
            meta.title = title;
        }
        if let Some(author) = self.author {
            meta.author = author;
        }
        if self.year.is_some() {
            meta.year = self.year;
        }
        if self.description.is_some() {
            meta.description = self.description;
        }
        if self.genre.is_some() {
            meta.genre = self.genre;
        }
        if self.publisher.is_some() {
            meta.publisher = self.publisher;
        }
        if self.isbn.is_some() {
            meta.isbn = self.isbn;
        }
        if self.page_count.is_some() {
            meta.page_count = self.page_count;
        }
        if self.language.is_some() {
            meta.language = self.language;
        }
    }
}

/// Row to insert for a freshly uploaded book.
#[derive(Debug, Clone)]
pub struct NewBook {
    /// Client-supplied metadata.
    pub metadata: BookMetadata,
    /// Generated PDF file name.
    pub pdf_path: String,
    /// PDF size in bytes.
    pub file_size: Option<i64>,
    /// Generated cover file name.
    pub cover_image: Option<String>,
}

/// Reading progress of one user on one book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingSession {
    /// Row ID.
    pub id: i64,
    /// User ID.
    pub user_id: i64,
    /// Book ID.
    pub book_id: i64,
    /// Last page viewed (>= 1).
    pub last_page: i64,
    /// Completion percentage (0.0 - 100.0).
    pub progress: f64,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// Validated progress report. At least one field is set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    /// New last page.
    pub last_page: Option<i64>,
    /// New completion percentage.
    pub progress: Option<f64>,
}

/// Aggregated reading progress for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingStats {
    /// Distinct books with a session.
    pub books_read: i64,
    /// Sum of progress percentages.
    pub total_progress: f64,
    /// Mean progress percentage.
    pub average_progress: f64,
}

/// Catalog filter and page window.
#[derive(Debug, Clone, Default)]
pub struct BookQuery {
    /// Substring matched against title, author and description.
    pub search: Option<String>,
    /// Substring matched against genre.
    pub genre: Option<String>,
    /// Rows to return.
    pub limit: u32,
    /// Rows to skip.
    pub offset: u64,
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}
