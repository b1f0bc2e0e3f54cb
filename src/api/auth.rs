//! Authentication endpoints: registration, OTP verification, login and tokens

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{enums::Role, user::User},
    services::auth::TokenPair,
    AppState,
};

use super::{AuthenticatedUser, ACCESS_COOKIE, REFRESH_COOKIE};

#[derive(Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, max = 120, message = "Name must be 1-120 characters"))]
    pub name: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    /// STUDENT (default) or TEACHER
    pub role: Option<Role>,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct VerifyEmailRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(equal = 4, message = "Code must be 4 digits"))]
    pub otp: String,
}

/// Body for endpoints that only need an address
#[derive(Deserialize, Validate, ToSchema)]
pub struct EmailRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: User,
}

/// The refresh token may come in the body or in the `refresh_token` cookie
#[derive(Deserialize, Default, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(equal = 4, message = "Code must be 4 digits"))]
    pub otp: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

fn auth_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

fn with_token_cookies(jar: CookieJar, tokens: &TokenPair, secure: bool) -> CookieJar {
    jar.add(auth_cookie(ACCESS_COOKIE, tokens.access_token.clone(), secure))
        .add(auth_cookie(REFRESH_COOKIE, tokens.refresh_token.clone(), secure))
}

/// Register a new patron account
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, verification code sent", body = User),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Role not allowed at registration"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    request.validate()?;

    let user = state
        .services
        .auth
        .register(&request.email, &request.name, &request.password, request.role)
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Confirm an email address with the emailed code
#[utoipa::path(
    post,
    path = "/auth/verify-email",
    tag = "auth",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = User),
        (status = 400, description = "Invalid or expired code"),
        (status = 409, description = "Already verified")
    )
)]
pub async fn verify_email(
    State(state): State<AppState>,
    Json(request): Json<VerifyEmailRequest>,
) -> AppResult<Json<User>> {
    request.validate()?;
    let user = state.services.auth.verify_email(&request.email, &request.otp).await?;
    Ok(Json(user))
}

/// Send a new verification code
#[utoipa::path(
    post,
    path = "/auth/resend-otp",
    tag = "auth",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Code sent if the account needs one", body = MessageResponse)
    )
)]
pub async fn resend_otp(
    State(state): State<AppState>,
    Json(request): Json<EmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    request.validate()?;
    state.services.auth.resend_verification(&request.email).await?;
    Ok(MessageResponse::new(
        "If the account exists and is unverified, a new code has been sent",
    ))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account deactivated or not verified")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    let (tokens, user) = state.services.auth.login(&request.email, &request.password).await?;
    let jar = with_token_cookies(jar, &tokens, state.config.auth.secure_cookies);
    Ok((jar, Json(LoginResponse { tokens, user })))
}

/// Rotate a refresh token into a new token pair
#[utoipa::path(
    post,
    path = "/auth/refresh-token",
    tag = "auth",
    request_body(content = RefreshRequest, description = "Optional when the refresh cookie is set"),
    responses(
        (status = 200, description = "New token pair", body = LoginResponse),
        (status = 401, description = "Refresh token invalid, expired or already used")
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    let presented = body
        .and_then(|Json(b)| b.refresh_token)
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()))
        .ok_or_else(|| AppError::Authentication("Missing refresh token".to_string()))?;

    let (tokens, user) = state.services.auth.refresh(&presented).await?;
    let jar = with_token_cookies(jar, &tokens, state.config.auth.secure_cookies);
    Ok((jar, Json(LoginResponse { tokens, user })))
}

/// Revoke the refresh token and clear auth cookies
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse)
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> AppResult<(CookieJar, Json<MessageResponse>)> {
    let presented = body
        .and_then(|Json(b)| b.refresh_token)
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()));

    state.services.auth.logout(presented.as_deref()).await?;

    let jar = jar
        .remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"));
    Ok((jar, MessageResponse::new("Logged out")))
}

/// Request a password reset code
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    tag = "auth",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Code sent if the account exists", body = MessageResponse)
    )
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(request): Json<EmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    request.validate()?;
    state.services.auth.forgot_password(&request.email).await?;
    Ok(MessageResponse::new(
        "If an account exists for this address, a reset code has been sent",
    ))
}

/// Set a new password with a reset code
#[utoipa::path(
    post,
    path = "/auth/reset-password",
    tag = "auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Invalid or expired code")
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    request.validate()?;
    state
        .services
        .auth
        .reset_password(&request.email, &request.otp, &request.new_password)
        .await?;
    Ok(MessageResponse::new("Password has been reset, please sign in again"))
}

/// Get current user profile
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<User>> {
    let user = state.services.users.get_by_id(claims.user_id).await?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_cookies_are_http_only() {
        let cookie = auth_cookie(ACCESS_COOKIE, "tok".to_string(), true);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[test]
    fn test_register_validation() {
        let ok = RegisterRequest {
            email: "reader@example.org".to_string(),
            name: "Reader".to_string(),
            password: "long enough".to_string(),
            role: None,
        };
        assert!(ok.validate().is_ok());

        let bad = RegisterRequest {
            email: "nope".to_string(),
            password: "short".to_string(),
            ..ok
        };
        assert!(bad.validate().is_err());
    }
}
