//! webreader: a small digital library server.
//!
//! Users register and sign in with bearer tokens, browse a paginated and
//! searchable catalog, upload PDFs (with optional covers), stream them back
//! and record how far they have read.
//!
//! # Features
//!
//! - Email/password accounts with signed, expiring tokens
//! - Catalog listing with search, genre filter and pagination
//! - Streaming PDF upload with size and type checks
//! - PDF streaming for in-browser readers
//! - One reading session per user and book, updated atomically
//! - Per-user reading statistics

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and user management.
pub mod auth;
/// Catalog and reading progress.
pub mod catalog;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// PDF inspection.
pub mod pdf;
/// HTTP server.
pub mod server;
/// Upload storage.
pub mod uploads;
/// Input validation rules.
pub mod validation;


pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;
