use crate::db::*;
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Arc;

const USER_COLUMNS: &str = "id, email, password_hash, created_at, last_login, is_active";

const BOOK_COLUMNS: &str = "id, title, author, year, description, genre, publisher, isbn, \
     page_count, cover_image, pdf_path, file_size, language, created_at, updated_at";

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        // SQLite's lower() and LIKE only fold ASCII.
        conn.create_scalar_function(
            "unicode_lower",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let value: Option<String> = ctx.get(0)?;
                Ok(value.map(|s| s.to_lowercase()))
            },
        )
        .map_err(|e| AppError::Internal(format!("Failed to register functions: {}", e)))?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Users table
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                last_login INTEGER,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            -- Books table
            CREATE TABLE IF NOT EXISTS books (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                year INTEGER CHECK (year >= 0 AND year <= 9999),
                description TEXT,
                genre TEXT,
                publisher TEXT,
                isbn TEXT,
                page_count INTEGER CHECK (page_count > 0),
                cover_image TEXT,
                pdf_path TEXT NOT NULL,
                file_size INTEGER,
                language TEXT DEFAULT 'fr',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Reading sessions: one row per (user, book)
            CREATE TABLE IF NOT EXISTS reading_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                book_id INTEGER NOT NULL,
                last_page INTEGER NOT NULL DEFAULT 1 CHECK (last_page >= 1),
                progress REAL NOT NULL DEFAULT 0 CHECK (progress >= 0 AND progress <= 100),
                updated_at INTEGER NOT NULL,
                UNIQUE (user_id, book_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_books_title ON books(title);
            CREATE INDEX IF NOT EXISTS idx_books_author ON books(author);
            CREATE INDEX IF NOT EXISTS idx_books_genre ON books(genre);
            CREATE INDEX IF NOT EXISTS idx_books_created ON books(created_at);
            CREATE INDEX IF NOT EXISTS idx_reading_sessions_user ON reading_sessions(user_id);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    /// Run raw SQL against the connection (tests that need a broken schema).
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(sql)
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    // ========== USER OPERATIONS ==========

    /// Create user. Fails with `DuplicateEmail` when the email is taken.
    pub fn create_user(&self, email: &str, password_hash: &str) -> Result<User> {
        let conn = self.conn.lock();
        let created_at = now_timestamp();

        conn.execute(
            "INSERT INTO users (email, password_hash, created_at, is_active)
             VALUES (?1, ?2, ?3, 1)",
            params![email, password_hash, created_at],
        )
        .map_err(|e| map_unique_email(e, "Failed to create user"))?;

        Ok(User {
            id: conn.last_insert_rowid(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at,
            last_login: None,
            is_active: true,
        })
    }

    /// Get user by email.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// Get user by ID.
    pub fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY email"))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let users = stmt
            .query_map([], Self::row_to_user)
            .map_err(|e| AppError::Internal(format!("Failed to list users: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect users: {}", e)))?;

        Ok(users)
    }

    /// Update user last login. Returns the stored timestamp.
    pub fn update_user_last_login(&self, user_id: i64) -> Result<i64> {
        let conn = self.conn.lock();
        let ts = now_timestamp();
        conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![ts, user_id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to update last login: {}", e)))?;
        Ok(ts)
    }

    /// Change a user's email. Fails with `DuplicateEmail` when taken.
    pub fn update_user_email(&self, user_id: i64, email: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET email = ?1 WHERE id = ?2",
                params![email, user_id],
            )
            .map_err(|e| map_unique_email(e, "Failed to update email"))?;
        Ok(rows > 0)
    }

    /// Activate or deactivate a user by email.
    pub fn set_user_active(&self, email: &str, active: bool) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET is_active = ?1 WHERE email = ?2",
                params![active, email],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update user: {}", e)))?;
        Ok(rows > 0)
    }

    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            created_at: row.get(3)?,
            last_login: row.get(4)?,
            is_active: row.get(5)?,
        })
    }

    // ========== BOOK OPERATIONS ==========

    /// Insert a book and return the stored row.
    pub fn create_book(&self, book: &NewBook) -> Result<Book> {
        let conn = self.conn.lock();
        let meta = &book.metadata;
        let now = now_timestamp();

        conn.query_row(
            &format!(
                "INSERT INTO books
                 (title, author, year, description, genre, publisher, isbn, page_count,
                  cover_image, pdf_path, file_size, language, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, COALESCE(?12, 'fr'), ?13, ?13)
                 RETURNING {BOOK_COLUMNS}"
            ),
            params![
                meta.title,
                meta.author,
                meta.year,
                meta.description,
                meta.genre,
                meta.publisher,
                meta.isbn,
                meta.page_count,
                book.cover_image,
                book.pdf_path,
                book.file_size,
                meta.language,
                now,
            ],
            Self::row_to_book,
        )
        .map_err(|e| AppError::Internal(format!("Failed to create book: {}", e)))
    }

    /// Get book by ID.
    pub fn get_book(&self, id: i64) -> Result<Option<Book>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?1"),
            params![id],
            Self::row_to_book,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get book: {}", e)))
    }

    /// One page of books, newest first, plus the total matching count.
    pub fn list_books(&self, query: &BookQuery) -> Result<(Vec<Book>, u64)> {
        let search = query.search.as_deref().map(like_pattern);
        let genre = query.genre.as_deref().map(like_pattern);

        let filter = r"(?1 IS NULL
                 OR unicode_lower(title) LIKE ?1 ESCAPE '\'
                 OR unicode_lower(author) LIKE ?1 ESCAPE '\'
                 OR unicode_lower(description) LIKE ?1 ESCAPE '\')
             AND (?2 IS NULL OR unicode_lower(genre) LIKE ?2 ESCAPE '\')";

        let conn = self.conn.lock();

        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM books WHERE {filter}"),
                params![search, genre],
                |row| row.get(0),
            )
            .map_err(|e| AppError::Internal(format!("Failed to count books: {}", e)))?;

        let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {BOOK_COLUMNS} FROM books WHERE {filter}
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?3 OFFSET ?4"
            ))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let books = stmt
            .query_map(
                params![search, genre, query.limit, offset],
                Self::row_to_book,
            )
            .map_err(|e| AppError::Internal(format!("Failed to list books: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect books: {}", e)))?;

        Ok((books, total.max(0) as u64))
    }

    /// Replace the descriptive fields of a book.
    pub fn update_book(&self, id: i64, meta: &BookMetadata) -> Result<Option<Book>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "UPDATE books SET
                    title = ?2, author = ?3, year = ?4, description = ?5, genre = ?6,
                    publisher = ?7, isbn = ?8, page_count = ?9,
                    language = COALESCE(?10, language), updated_at = ?11
                 WHERE id = ?1
                 RETURNING {BOOK_COLUMNS}"
            ),
            params![
                id,
                meta.title,
                meta.author,
                meta.year,
                meta.description,
                meta.genre,
                meta.publisher,
                meta.isbn,
                meta.page_count,
                meta.language,
                now_timestamp(),
            ],
            Self::row_to_book,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to update book: {}", e)))
    }

    /// Delete book. Its reading sessions cascade.
    pub fn delete_book(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM books WHERE id = ?1", params![id])
            .map_err(|e| AppError::Internal(format!("Failed to delete book: {}", e)))?;
        Ok(rows > 0)
    }

    /// Distinct non-empty genres, alphabetical.
    pub fn list_genres(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT genre FROM books
                 WHERE genre IS NOT NULL AND TRIM(genre) <> ''
                 ORDER BY genre",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let genres = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| AppError::Internal(format!("Failed to list genres: {}", e)))?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect genres: {}", e)))?;

        Ok(genres)
    }

    fn row_to_book(row: &rusqlite::Row<'_>) -> rusqlite::Result<Book> {
        Ok(Book {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            year: row.get(3)?,
            description: row.get(4)?,
            genre: row.get(5)?,
            publisher: row.get(6)?,
            isbn: row.get(7)?,
            page_count: row.get(8)?,
            cover_image: row.get(9)?,
            pdf_path: row.get(10)?,
            file_size: row.get(11)?,
            language: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    // ========== READING SESSION OPERATIONS ==========

    /// Insert or update the session for `(user_id, book_id)` in one statement.
    ///
    /// A field left out of `update` keeps its stored value, or takes the
    /// column default (page 1, 0%) when the row is new.
    pub fn upsert_session(
        &self,
        user_id: i64,
        book_id: i64,
        update: &ProgressUpdate,
    ) -> Result<ReadingSession> {
        let conn = self.conn.lock();
        conn.query_row(
            "INSERT INTO reading_sessions (user_id, book_id, last_page, progress, updated_at)
             VALUES (?1, ?2, COALESCE(?3, 1), COALESCE(?4, 0), ?5)
             ON CONFLICT (user_id, book_id) DO UPDATE SET
                last_page = COALESCE(?3, reading_sessions.last_page),
                progress = COALESCE(?4, reading_sessions.progress),
                updated_at = excluded.updated_at
             RETURNING id, user_id, book_id, last_page, progress, updated_at",
            params![
                user_id,
                book_id,
                update.last_page,
                update.progress,
                now_timestamp(),
            ],
            Self::row_to_session,
        )
        .map_err(|e| {
            if is_constraint(&e, rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY) {
                AppError::NotFound(format!("Book not found: {}", book_id))
            } else {
                AppError::Internal(format!("Failed to save reading session: {}", e))
            }
        })
    }

    /// Get the session for a user and book.
    pub fn get_session(&self, user_id: i64, book_id: i64) -> Result<Option<ReadingSession>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, user_id, book_id, last_page, progress, updated_at
             FROM reading_sessions
             WHERE user_id = ?1 AND book_id = ?2",
            params![user_id, book_id],
            Self::row_to_session,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get reading session: {}", e)))
    }

    /// Aggregate a user's sessions.
    pub fn get_reading_stats(&self, user_id: i64) -> Result<ReadingStats> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(DISTINCT book_id),
                    COALESCE(SUM(progress), 0.0),
                    COALESCE(AVG(progress), 0.0)
             FROM reading_sessions WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(ReadingStats {
                    books_read: row.get(0)?,
                    total_progress: row.get(1)?,
                    average_progress: row.get(2)?,
                })
            },
        )
        .map_err(|e| AppError::Internal(format!("Failed to get reading stats: {}", e)))
    }

    fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReadingSession> {
        Ok(ReadingSession {
            id: row.get(0)?,
            user_id: row.get(1)?,
            book_id: row.get(2)?,
            last_page: row.get(3)?,
            progress: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

/// Lowercased `%term%` with LIKE wildcards in `term` escaped.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn is_constraint(err: &rusqlite::Error, extended_code: std::os::raw::c_int) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == extended_code
    )
}

fn map_unique_email(err: rusqlite::Error, context: &str) -> AppError {
    if is_constraint(&err, rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE) {
        AppError::DuplicateEmail
    } else {
        AppError::Internal(format!("{}: {}", context, err))
    }
}
