//! API handlers for Librarium REST endpoints

pub mod auth;
pub mod fines;
pub mod health;
pub mod items;
pub mod loans;
pub mod openapi;
pub mod reservations;
pub mod stats;
pub mod users;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use axum_extra::extract::CookieJar;

use crate::{
    error::AppError,
    models::user::{TokenType, UserClaims},
    AppState,
};

pub use items::PaginatedResponse;

/// Cookie carrying the access token for browser clients
pub const ACCESS_COOKIE: &str = "access_token";
/// Cookie carrying the refresh token
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

/// Bearer header first, then the access cookie
fn bearer_or_cookie(parts: &Parts) -> Result<String, AppError> {
    if let Some(auth_header) = parts.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        return auth_header
            .strip_prefix("Bearer ")
            .map(|t| t.trim().to_string())
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()));
    }

    CookieJar::from_headers(&parts.headers)
        .get(ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_or_cookie(parts)?;

        let claims = UserClaims::from_token(&token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        // refresh tokens only buy new pairs at /auth/refresh-token
        if claims.token_type != TokenType::Access {
            return Err(AppError::Authentication("Access token required".to_string()));
        }

        Ok(AuthenticatedUser(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(header: Option<(&str, &str)>) -> Parts {
        let mut builder = Request::builder().uri("/api/v1/auth/me");
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_header_wins() {
        let p = parts(Some(("authorization", "Bearer abc.def")));
        assert_eq!(bearer_or_cookie(&p).unwrap(), "abc.def");
    }

    #[test]
    fn test_cookie_fallback() {
        let p = parts(Some(("cookie", "theme=dark; access_token=xyz")));
        assert_eq!(bearer_or_cookie(&p).unwrap(), "xyz");
    }

    #[test]
    fn test_missing_or_malformed_credentials() {
        assert!(bearer_or_cookie(&parts(None)).is_err());
        assert!(bearer_or_cookie(&parts(Some(("authorization", "Basic Zm9v")))).is_err());
    }
}
