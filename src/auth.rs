//! Authentication module.

use crate::db::{Database, User};
use crate::error::{AppError, Result};
use crate::validation;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Hash a password using Argon2.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Bearer token claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID.
    pub sub: String,
    /// Issued-at timestamp.
    pub iat: usize,
    /// Expiration timestamp.
    pub exp: usize,
}

/// HS256 signing keys plus token lifetime.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl TokenKeys {
    /// Build keys from a shared secret.
    pub fn new(secret: &str, lifetime_days: u32) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime: Duration::days(i64::from(lifetime_days)),
        }
    }

    /// Sign a token carrying `user_id`.
    pub fn sign(&self, user_id: i64) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp().max(0) as usize,
            exp: (now + self.lifetime).timestamp().max(0) as usize,
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Check signature and expiry, return the user ID.
    pub fn verify(&self, token: &str) -> Result<i64> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|_| AppError::InvalidToken)?;

        data.claims
            .sub
            .parse()
            .map_err(|_| AppError::InvalidToken)
    }
}

/// Profile fields a user may change.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    /// New login email.
    pub email: Option<String>,
}

/// Authentication service.
pub struct AuthService {
    db: Database,
    keys: TokenKeys,
    registration_enabled: bool,
}

impl AuthService {
    /// Create a new auth service.
    pub fn new(db: Database, keys: TokenKeys, registration_enabled: bool) -> Self {
        Self {
            db,
            keys,
            registration_enabled,
        }
    }

    /// Register a new user and issue a token.
    pub fn register(
        &self,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<(User, String)> {
        if !self.registration_enabled {
            return Err(AppError::RegistrationDisabled);
        }

        validation::validate_registration(email, password, confirm_password)?;
        let email = normalize_email(email);

        if self.db.get_user_by_email(&email)?.is_some() {
            return Err(AppError::DuplicateEmail);
        }

        let password_hash = hash_password(password)?;
        // The UNIQUE index still catches a concurrent registration.
        let user = self.db.create_user(&email, &password_hash)?;
        let token = self.keys.sign(user.id)?;

        tracing::info!(user_id = user.id, "User registered");
        Ok((user, token))
    }

    /// Check credentials and issue a token.
    ///
    /// Unknown email, wrong password and deactivated account all fail with
    /// the same `InvalidCredentials` error.
    pub fn login(&self, email: &str, password: &str) -> Result<(User, String)> {
        validation::validate_login(email, password)?;

        let mut user = self
            .db
            .get_user_by_email(&normalize_email(email))?
            .ok_or(AppError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash)? || !user.is_active {
            return Err(AppError::InvalidCredentials);
        }

        user.last_login = Some(self.db.update_user_last_login(user.id)?);
        let token = self.keys.sign(user.id)?;

        tracing::debug!(user_id = user.id, "User logged in");
        Ok((user, token))
    }

    /// Validate a token and return the user ID it carries.
    pub fn verify(&self, token: &str) -> Result<i64> {
        self.keys.verify(token)
    }

    /// Validate a token and load its user, who must still be active.
    pub fn authenticate(&self, token: &str) -> Result<User> {
        let user_id = self.verify(token)?;
        self.db
            .get_user_by_id(user_id)?
            .filter(|u| u.is_active)
            .ok_or(AppError::InvalidToken)
    }

    /// Get a user's profile.
    pub fn get_profile(&self, user_id: i64) -> Result<User> {
        self.db
            .get_user_by_id(user_id)?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Apply a profile update.
    pub fn update_profile(&self, user_id: i64, update: ProfileUpdate) -> Result<User> {
        if let Some(email) = update.email {
            let email = normalize_email(&email);
            if !validation::is_valid_email(&email) {
                return Err(AppError::InvalidEmailFormat);
            }
            if !self.db.update_user_email(user_id, &email)? {
                return Err(AppError::NotFound("User not found".to_string()));
            }
            tracing::info!(user_id, "Profile email updated");
        }

        self.get_profile(user_id)
    }

    /// Activate or deactivate an account.
    pub fn set_active(&self, email: &str, active: bool) -> Result<bool> {
        self.db.set_user_active(&normalize_email(email), active)
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.db.list_users()
    }
}

/// Emails are compared trimmed and lowercased.
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
