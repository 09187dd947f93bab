//! Request extractors.

use crate::db::User;
use crate::error::AppError;
use crate::server::AppState;
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::{HeaderMap, header, request::Parts};

/// JSON body whose rejections use the API error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Authenticated, active user taken from `Authorization: Bearer <token>`.
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AppError::MissingToken)?;
        let user = state.auth.authenticate(token)?;
        Ok(AuthUser(user))
    }
}

/// Caller identity when present. A missing or bad token means anonymous.
pub struct OptionalAuthUser(pub Option<User>);

impl FromRequestParts<AppState> for OptionalAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = match bearer_token(&parts.headers) {
            Some(token) => match state.auth.authenticate(token) {
                Ok(user) => Some(user),
                Err(AppError::InvalidToken) => None,
                Err(e) => return Err(e),
            },
            None => None,
        };
        Ok(OptionalAuthUser(user))
    }
}

/// Token from a `Bearer` authorization header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
