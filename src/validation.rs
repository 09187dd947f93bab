//! Request validation. Pure functions, no I/O.

use crate::db::{BookMetadata, ProgressUpdate};
use crate::error::{AppError, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Minimum password length.
pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// Check an email against `local@domain.tld`.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// Password must be long enough and mix upper, lower and digits.
pub fn validate_password_strength(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::WeakPassword(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !has_upper || !has_lower || !has_digit {
        return Err(AppError::WeakPassword(
            "Password must contain uppercase, lowercase and digits".to_string(),
        ));
    }

    Ok(())
}

/// Registration fields: all present, matching, strong, well-formed email.
pub fn validate_registration(email: &str, password: &str, confirm_password: &str) -> Result<()> {
    if email.trim().is_empty() || password.is_empty() || confirm_password.is_empty() {
        return Err(AppError::Validation(
            "Email, password and confirmation are required".to_string(),
        ));
    }

    if password != confirm_password {
        return Err(AppError::PasswordMismatch);
    }

    validate_password_strength(password)?;

    if !is_valid_email(email) {
        return Err(AppError::InvalidEmailFormat);
    }

    Ok(())
}

/// Login fields: both present.
pub fn validate_login(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AppError::Validation(
            "Email and password are required".to_string(),
        ));
    }
    Ok(())
}

/// Book metadata: title and author, plausible year, positive page count.
pub fn validate_book(meta: &BookMetadata, current_year: i32) -> Result<()> {
    if meta.title.trim().is_empty() || meta.author.trim().is_empty() {
        return Err(AppError::Validation(
            "Title and author are required".to_string(),
        ));
    }

    if let Some(year) = meta.year
        && !(0..=current_year).contains(&year)
    {
        return Err(AppError::Validation(format!(
            "Publication year must be between 0 and {}",
            current_year
        )));
    }

    if let Some(pages) = meta.page_count
        && pages <= 0
    {
        return Err(AppError::Validation(
            "Page count must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

/// Progress report: at least one field, whole positive page, 0-100 percent.
pub fn validate_progress(last_page: Option<f64>, progress: Option<f64>) -> Result<ProgressUpdate> {
    if last_page.is_none() && progress.is_none() {
        return Err(AppError::Validation(
            "At least one of lastPage or progress is required".to_string(),
        ));
    }

    let last_page = match last_page {
        Some(page) if page < 1.0 || page.fract() != 0.0 || page > i64::MAX as f64 => {
            return Err(AppError::Validation(
                "lastPage must be a positive integer".to_string(),
            ));
        }
        Some(page) => Some(page as i64),
        None => None,
    };

    if let Some(p) = progress
        && !(0.0..=100.0).contains(&p)
    {
        return Err(AppError::Validation(
            "progress must be between 0 and 100".to_string(),
        ));
    }

    Ok(ProgressUpdate {
        last_page,
        progress,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(title: &str, author: &str) -> BookMetadata {
        BookMetadata {
            title: title.to_string(),
            author: author.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_email_format() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last@sub.example.org"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("a b@x.com"));
    }

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("Passw0rd").is_ok());
        assert!(matches!(
            validate_password_strength("Pa0"),
            Err(AppError::WeakPassword(_))
        ));
        assert!(matches!(
            validate_password_strength("password1"),
            Err(AppError::WeakPassword(_))
        ));
        assert!(matches!(
            validate_password_strength("PASSWORD1"),
            Err(AppError::WeakPassword(_))
        ));
        assert!(matches!(
            validate_password_strength("Password"),
            Err(AppError::WeakPassword(_))
        ));
    }

    #[test]
    fn test_registration_rules() {
        assert!(validate_registration("a@x.com", "Passw0rd", "Passw0rd").is_ok());
        assert!(matches!(
            validate_registration("", "Passw0rd", "Passw0rd"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_registration("a@x.com", "Passw0rd", "Passw0rd!"),
            Err(AppError::PasswordMismatch)
        ));
        assert!(matches!(
            validate_registration("a@x.com", "weak", "weak"),
            Err(AppError::WeakPassword(_))
        ));
        assert!(matches!(
            validate_registration("not-an-email", "Passw0rd", "Passw0rd"),
            Err(AppError::InvalidEmailFormat)
        ));
    }

    #[test]
    fn test_book_rules() {
        assert!(validate_book(&meta("T", "A"), 2026).is_ok());
        assert!(validate_book(&meta("", "A"), 2026).is_err());
        assert!(validate_book(&meta("T", "   "), 2026).is_err());

        let mut future = meta("T", "A");
        future.year = Some(2027);
        assert!(validate_book(&future, 2026).is_err());
        future.year = Some(2026);
        assert!(validate_book(&future, 2026).is_ok());

        let mut pages = meta("T", "A");
        pages.page_count = Some(0);
        assert!(validate_book(&pages, 2026).is_err());
    }

    #[test]
    fn test_progress_rules() {
        assert!(validate_progress(None, None).is_err());
        assert!(validate_progress(Some(0.0), None).is_err());
        assert!(validate_progress(Some(2.5), None).is_err());
        assert!(validate_progress(None, Some(100.5)).is_err());
        assert!(validate_progress(None, Some(-1.0)).is_err());

        let update = validate_progress(Some(5.0), Some(10.0)).unwrap();
        assert_eq!(update.last_page, Some(5));
        assert_eq!(update.progress, Some(10.0));

        let only_progress = validate_progress(None, Some(0.0)).unwrap();
        assert_eq!(only_progress.last_page, None);
    }
}
