//! Registration, email verification, login and token rotation

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    email::EmailService,
    otp::{OtpPurpose, OtpService},
    token_store::TokenStore,
};
use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::{
        enums::Role,
        user::{CreateUser, TokenType, User, UserClaims},
    },
    repository::Repository,
};

/// Access and refresh tokens handed out on login and refresh
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Emails are compared case-insensitively
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn refresh_key(jti: &str) -> String {
    format!("refresh:{}", jti)
}

fn revoked_before_key(user_id: i32) -> String {
    format!("refresh_revoked_before:{}", user_id)
}

/// Build claims for a user, valid for `ttl_seconds` from `now`
pub fn build_claims(user: &User, token_type: TokenType, ttl_seconds: i64, now: DateTime<Utc>) -> UserClaims {
    let iat = now.timestamp();
    UserClaims {
        sub: user.email.clone(),
        user_id: user.id,
        role: user.role,
        token_type,
        jti: Uuid::new_v4().to_string(),
        exp: iat + ttl_seconds,
        iat,
        iat_ms: now.timestamp_millis(),
    }
}

/// Tokens issued at or before a revocation cutoff are dead; both in milliseconds
fn revoked_by_cutoff(iat_ms: i64, cutoff_ms: Option<i64>) -> bool {
    cutoff_ms.is_some_and(|cutoff| iat_ms <= cutoff)
}

#[derive(Clone)]
pub struct AuthService {
    repository: Repository,
    config: AuthConfig,
    store: Arc<dyn TokenStore>,
    otp: OtpService,
    email: EmailService,
}

impl AuthService {
    pub fn new(
        repository: Repository,
        config: AuthConfig,
        store: Arc<dyn TokenStore>,
        email: EmailService,
    ) -> Self {
        let otp = OtpService::new(store.clone(), config.otp_ttl_minutes, config.otp_max_attempts);
        Self {
            repository,
            config,
            store,
            otp,
            email,
        }
    }

    fn refresh_ttl_seconds(&self) -> i64 {
        self.config.refresh_token_days * 24 * 3600
    }

    /// Create an unverified account and email a verification code
    pub async fn register(&self, email: &str, name: &str, password: &str, role: Option<Role>) -> AppResult<User> {
        let role = role.unwrap_or(Role::Student);
        if !role.is_self_assignable() {
            return Err(AppError::Authorization(format!(
                "Role {} cannot be chosen at registration",
                role
            )));
        }

        let email = normalize_email(email);
        if self.repository.users.email_exists(&email).await? {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let user = self
            .repository
            .users
            .create(&CreateUser {
                email,
                name: name.trim().to_string(),
                password_hash: hash_password(password)?,
                role,
                is_verified: false,
            })
            .await?;

        tracing::info!(user_id = user.id, role = %user.role, "User registered");
        self.send_verification(&user).await?;
        Ok(user)
    }

    async fn send_verification(&self, user: &User) -> AppResult<()> {
        let code = self.otp.issue(OtpPurpose::VerifyEmail, user.id).await?;
        if let Err(e) = self
            .email
            .send_verification_code(&user.email, &user.name, &code, self.otp.ttl_minutes())
            .await
        {
            tracing::warn!(user_id = user.id, "Failed to send verification email: {}", e);
        }
        Ok(())
    }

    /// Send a fresh verification code. Silent for unknown or verified accounts.
    pub async fn resend_verification(&self, email: &str) -> AppResult<()> {
        match self.repository.users.get_by_email(&normalize_email(email)).await? {
            Some(user) if !user.is_verified => self.send_verification(&user).await,
            _ => Ok(()),
        }
    }

    pub async fn verify_email(&self, email: &str, code: &str) -> AppResult<User> {
        let user = self
            .repository
            .users
            .get_by_email(&normalize_email(email))
            .await?
            .ok_or_else(|| AppError::Validation("Invalid or expired code".to_string()))?;

        if user.is_verified {
            return Err(AppError::Conflict("Email already verified".to_string()));
        }

        self.otp.verify(OtpPurpose::VerifyEmail, user.id, code).await?;
        let user = self.repository.users.set_verified(user.id, true).await?;
        tracing::info!(user_id = user.id, "Email verified");
        Ok(user)
    }

    /// Check credentials and hand out a token pair
    pub async fn login(&self, email: &str, password: &str) -> AppResult<(TokenPair, User)> {
        let user = self
            .repository
            .users
            .get_by_email(&normalize_email(email))
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid email or password".to_string()))?;

        if !verify_password(password, &user.password)? {
            tracing::info!(user_id = user.id, "Login rejected: wrong password");
            return Err(AppError::Authentication("Invalid email or password".to_string()));
        }

        Self::ensure_can_sign_in(&user)?;

        let tokens = self.issue_tokens(&user).await?;
        tracing::info!(user_id = user.id, "User logged in");
        Ok((tokens, user))
    }

    fn ensure_can_sign_in(user: &User) -> AppResult<()> {
        if !user.is_active {
            return Err(AppError::Authorization("Account is deactivated".to_string()));
        }
        if !user.is_verified {
            return Err(AppError::NotVerified(
                "Please verify your email before signing in".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn issue_tokens(&self, user: &User) -> AppResult<TokenPair> {
        let now = Utc::now();
        let access_ttl = self.config.access_token_minutes * 60;
        let refresh_ttl = self.refresh_ttl_seconds();

        let access = build_claims(user, TokenType::Access, access_ttl, now);
        let refresh = build_claims(user, TokenType::Refresh, refresh_ttl, now);

        let sign = |claims: &UserClaims| {
            claims
                .create_token(&self.config.jwt_secret)
                .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
        };
        let access_token = sign(&access)?;
        let refresh_token = sign(&refresh)?;

        self.store
            .set(&refresh_key(&refresh.jti), &user.id.to_string(), refresh_ttl as u64)
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: access_ttl,
        })
    }

    /// Trade a live refresh token for a new pair; the old one is consumed
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<(TokenPair, User)> {
        let claims = UserClaims::from_token(refresh_token, &self.config.jwt_secret)
            .map_err(|_| AppError::Authentication("Invalid refresh token".to_string()))?;

        if claims.token_type != TokenType::Refresh {
            return Err(AppError::Authentication("Not a refresh token".to_string()));
        }

        let cutoff = self
            .store
            .get(&revoked_before_key(claims.user_id))
            .await?
            .and_then(|v| v.parse::<i64>().ok());
        if revoked_by_cutoff(claims.iat_ms, cutoff) {
            return Err(AppError::Authentication("Refresh token revoked".to_string()));
        }

        // delete doubles as the liveness check, so a replayed token loses the race
        if !self.store.delete(&refresh_key(&claims.jti)).await? {
            tracing::warn!(user_id = claims.user_id, "Refresh token reuse or expiry");
            return Err(AppError::Authentication("Refresh token revoked".to_string()));
        }

        let user = self.repository.users.get_by_id(claims.user_id).await?;
        Self::ensure_can_sign_in(&user)?;

        let tokens = self.issue_tokens(&user).await?;
        Ok((tokens, user))
    }

    /// Revoke the given refresh token, if it parses
    pub async fn logout(&self, refresh_token: Option<&str>) -> AppResult<()> {
        if let Some(claims) =
            refresh_token.and_then(|t| UserClaims::from_token(t, &self.config.jwt_secret).ok())
        {
            self.store.delete(&refresh_key(&claims.jti)).await?;
            tracing::info!(user_id = claims.user_id, "User logged out");
        }
        Ok(())
    }

    /// Email a reset code when the account exists; never reveals whether it does
    pub async fn forgot_password(&self, email: &str) -> AppResult<()> {
        let Some(user) = self.repository.users.get_by_email(&normalize_email(email)).await? else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        };
        if !user.is_active {
            return Ok(());
        }

        let code = self.otp.issue(OtpPurpose::ResetPassword, user.id).await?;
        if let Err(e) = self
            .email
            .send_password_reset_code(&user.email, &user.name, &code, self.otp.ttl_minutes())
            .await
        {
            tracing::warn!(user_id = user.id, "Failed to send password reset email: {}", e);
        }
        Ok(())
    }

    pub async fn reset_password(&self, email: &str, code: &str, new_password: &str) -> AppResult<()> {
        let user = self
            .repository
            .users
            .get_by_email(&normalize_email(email))
            .await?
            .ok_or_else(|| AppError::Validation("Invalid or expired code".to_string()))?;

        self.otp.verify(OtpPurpose::ResetPassword, user.id, code).await?;
        self.repository
            .users
            .update_password(user.id, &hash_password(new_password)?)
            .await?;
        self.revoke_all_sessions(user.id).await?;

        tracing::info!(user_id = user.id, "Password reset");
        Ok(())
    }

    /// Invalidate every refresh token issued to the user so far
    pub async fn revoke_all_sessions(&self, user_id: i32) -> AppResult<()> {
        self.store
            .set(
                &revoked_before_key(user_id),
                &Utc::now().timestamp_millis().to_string(),
                self.refresh_ttl_seconds() as u64,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user(role: Role) -> User {
        User {
            id: 3,
            email: "reader@example.org".to_string(),
            name: "Reader".to_string(),
            password: String::new(),
            role,
            is_verified: true,
            is_active: true,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_password_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert_ne!(hash, "correct horse");
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
        assert!(verify_password("x", "not-a-hash").is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Reader@Example.ORG "), "reader@example.org");
    }

    #[test]
    fn test_build_claims_carries_role_and_lifetime() {
        let now = Utc::now();
        let claims = build_claims(&user(Role::Teacher), TokenType::Access, 900, now);
        assert_eq!(claims.user_id, 3);
        assert_eq!(claims.role, Role::Teacher);
        assert_eq!(claims.exp - claims.iat, 900);

        let other = build_claims(&user(Role::Teacher), TokenType::Access, 900, now);
        assert_ne!(claims.jti, other.jti);
    }

    #[test]
    fn test_revocation_cutoff() {
        assert!(!revoked_by_cutoff(100, None));
        assert!(revoked_by_cutoff(100, Some(100)));
        assert!(revoked_by_cutoff(99, Some(100)));
        assert!(!revoked_by_cutoff(101, Some(100)));
    }

    #[test]
    fn test_login_in_same_second_as_reset_survives_cutoff() {
        let reset_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + chrono::Duration::milliseconds(200);
        let cutoff = Some(reset_at.timestamp_millis());

        let before = build_claims(
            &user(Role::Student),
            TokenType::Refresh,
            60,
            reset_at - chrono::Duration::milliseconds(150),
        );
        let after = build_claims(
            &user(Role::Student),
            TokenType::Refresh,
            60,
            reset_at + chrono::Duration::milliseconds(300),
        );
        assert_eq!(before.iat, after.iat);
        assert!(revoked_by_cutoff(before.iat_ms, cutoff));
        assert!(!revoked_by_cutoff(after.iat_ms, cutoff));
    }

    #[test]
    fn test_sign_in_requires_active_and_verified() {
        assert!(AuthService::ensure_can_sign_in(&user(Role::Student)).is_ok());

        let mut inactive = user(Role::Student);
        inactive.is_active = false;
        assert!(matches!(
            AuthService::ensure_can_sign_in(&inactive),
            Err(AppError::Authorization(_))
        ));

        let mut unverified = user(Role::Student);
        unverified.is_verified = false;
        assert!(matches!(
            AuthService::ensure_can_sign_in(&unverified),
            Err(AppError::NotVerified(_))
        ));
    }
}
