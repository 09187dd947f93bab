//! HTTP request handlers.

use crate::auth::ProfileUpdate;
use crate::catalog::{BookDetail, BookPage, ListParams, PdfFile};
use crate::db::{Book, BookMetadata, BookUpdate, ReadingSession, ReadingStats, User};
use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::server::extract::{ApiJson, AuthUser, OptionalAuthUser};
use crate::uploads::{StoredFile, UploadKind, UploadStore};
use crate::validation;
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State, multipart::MultipartRejection},
    http::{StatusCode, Uri, header},
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::io::ReaderStream;

/// `{user, token}`
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    user: User,
    token: String,
}

/// `{user}`
#[derive(Debug, Serialize)]
pub struct UserResponse {
    user: User,
}

/// `{book}`
#[derive(Debug, Serialize)]
pub struct BookResponse {
    book: Book,
}

/// `{session}`
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    session: ReadingSession,
}

/// `{genres}`
#[derive(Debug, Serialize)]
pub struct GenresResponse {
    genres: Vec<String>,
}

/// `{items}`
#[derive(Debug, Serialize)]
pub struct ItemsResponse {
    items: Vec<Book>,
}

/// Health check body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

// ============================================================================
// AUTH API
// ============================================================================

/// Registration request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    confirm_password: String,
}

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

/// Create an account and sign it in.
pub async fn auth_register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let (user, token) = state
        .auth
        .register(&req.email, &req.password, &req.confirm_password)?;

    Ok((StatusCode::CREATED, Json(AuthResponse { user, token })))
}

/// Exchange credentials for a token.
pub async fn auth_login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let (user, token) = state.auth.login(&req.email, &req.password)?;
    Ok(Json(AuthResponse { user, token }))
}

/// Current user.
pub async fn auth_profile(AuthUser(user): AuthUser) -> Json<UserResponse> {
    Json(UserResponse { user })
}

/// Update the current user's email.
pub async fn auth_update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> Result<Json<UserResponse>> {
    let user = state.auth.update_profile(user.id, update)?;
    Ok(Json(UserResponse { user }))
}

// ============================================================================
// BOOKS API
// ============================================================================

/// Paginated, filtered catalog.
pub async fn books_list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<BookPage>> {
    Ok(Json(state.catalog.list_books(&params)?))
}

/// One book, with the caller's session when signed in.
pub async fn books_get(
    State(state): State<AppState>,
    OptionalAuthUser(viewer): OptionalAuthUser,
    Path(id): Path<String>,
) -> Result<Json<BookDetail>> {
    let id = parse_book_id(&id)?;
    let detail = state.catalog.get_book(id, viewer.map(|u| u.id))?;
    Ok(Json(detail))
}

/// Stream the book's PDF.
pub async fn books_pdf(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response<Body>> {
    let id = parse_book_id(&id)?;
    let PdfFile { book, file, len } = state.catalog.open_pdf(id).await?;

    let body = Body::from_stream(ReaderStream::new(file));
    let filename = format!("{}.pdf", book.title);
    let content_disposition = format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_filename(&filename),
        urlencoding::encode(&filename)
    );

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_DISPOSITION, content_disposition)
        .header(header::CONTENT_LENGTH, len)
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(body)
        .unwrap_or_else(|_| Response::default()))
}

/// Create a book from a multipart form: `pdf`, optional `cover`, metadata
/// fields.
pub async fn books_create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<BookResponse>)> {
    let mut multipart = multipart.map_err(|e| AppError::Upload(e.body_text()))?;
    let uploads = state.catalog.uploads();
    let mut pdf: Option<StoredFile> = None;
    let mut cover: Option<StoredFile> = None;
    let mut fields = HashMap::new();

    let parsed = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Upload(format!("Invalid multipart body: {}", e.body_text())))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "pdf" => {
                    let stored = uploads.save_field(UploadKind::Pdf, field).await?;
                    replace_upload(uploads, &mut pdf, stored).await;
                }
                "cover" => {
                    let stored = uploads.save_field(UploadKind::Cover, field).await?;
                    replace_upload(uploads, &mut cover, stored).await;
                }
                _ => {
                    let value = field.text().await.map_err(|e| {
                        AppError::Upload(format!("Invalid field {}: {}", name, e.body_text()))
                    })?;
                    fields.insert(name, value);
                }
            }
        }
        metadata_from_fields(&fields)
    }
    .await;

    let metadata = match parsed {
        Ok(metadata) => metadata,
        Err(e) => {
            for file in pdf.iter().chain(cover.iter()) {
                uploads.discard(file).await;
            }
            return Err(e);
        }
    };

    let book = state.catalog.create_book(metadata, pdf, cover).await?;
    tracing::debug!(user_id = user.id, book_id = book.id, "Book uploaded");

    Ok((StatusCode::CREATED, Json(BookResponse { book })))
}

/// Patch a book's metadata.
pub async fn books_update(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<BookUpdate>,
) -> Result<Json<BookResponse>> {
    let id = parse_book_id(&id)?;
    let book = state.catalog.update_book(id, update)?;
    Ok(Json(BookResponse { book }))
}

/// Delete a book and its files.
pub async fn books_delete(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let id = parse_book_id(&id)?;
    state.catalog.delete_book(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Progress report body. Numbers are checked before narrowing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    last_page: Option<f64>,
    progress: Option<f64>,
}

/// Record reading progress for the caller.
pub async fn books_progress(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<ProgressRequest>,
) -> Result<Json<SessionResponse>> {
    let book_id = parse_book_id(&id)?;
    let update = validation::validate_progress(req.last_page, req.progress)?;
    let session = state.catalog.upsert_progress(user.id, book_id, update)?;
    Ok(Json(SessionResponse { session }))
}

/// Caller's reading statistics.
pub async fn books_user_stats(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<ReadingStats>> {
    Ok(Json(state.catalog.reading_stats(user.id)?))
}

/// Distinct genres.
pub async fn books_genres(State(state): State<AppState>) -> Result<Json<GenresResponse>> {
    let genres = state.catalog.list_genres()?;
    Ok(Json(GenresResponse { genres }))
}

/// Seed the demo titles.
pub async fn books_create_samples(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<(StatusCode, Json<ItemsResponse>)> {
    let items = state.catalog.create_samples()?;
    tracing::info!(user_id = user.id, count = items.len(), "Sample books created");
    Ok((StatusCode::CREATED, Json(ItemsResponse { items })))
}

// ============================================================================
// MISC
// ============================================================================

/// Liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Unknown route.
pub async fn route_not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("Route not found: {}", uri.path()))
}

// ============================================================================
// HELPERS
// ============================================================================

/// Non-numeric IDs cannot name a book.
fn parse_book_id(raw: &str) -> Result<i64> {
    raw.parse()
        .map_err(|_| AppError::NotFound(format!("Book not found: {}", raw)))
}

/// Keep the newest upload for a field, dropping a repeated one.
async fn replace_upload(store: &UploadStore, slot: &mut Option<StoredFile>, file: StoredFile) {
    if let Some(previous) = slot.replace(file) {
        store.discard(&previous).await;
    }
}

fn metadata_from_fields(fields: &HashMap<String, String>) -> Result<BookMetadata> {
    let text = |key: &str| {
        fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let year = text("year")
        .map(|v| {
            v.parse::<i32>()
                .map_err(|_| AppError::Validation("Publication year must be a number".to_string()))
        })
        .transpose()?;

    let page_count = text("pageCount")
        .or_else(|| text("page_count"))
        .map(|v| {
            v.parse::<i64>()
                .map_err(|_| AppError::Validation("Page count must be a number".to_string()))
        })
        .transpose()?;

    Ok(BookMetadata {
        title: text("title").unwrap_or_default(),
        author: text("author").unwrap_or_default(),
        year,
        description: text("description"),
        genre: text("genre"),
        publisher: text("publisher"),
        isbn: text("isbn"),
        page_count,
        language: text("language"),
    })
}

/// Quoted `filename=` fallback: printable ASCII only.
fn ascii_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}
