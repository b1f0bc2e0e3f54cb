//! User profile and administration service

use validator::Validate;

use super::auth::{hash_password, normalize_email, verify_password};
use crate::{
    config::AdminConfig,
    error::{AppError, AppResult},
    models::{
        enums::Role,
        user::{CreateUser, UpdateProfile, User, UserQuery},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
}

impl UsersService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    /// Search users with pagination
    pub async fn search(&self, query: &UserQuery) -> AppResult<(Vec<User>, i64)> {
        self.repository.users.search(query).await
    }

    /// Update the caller's own name, contact details and password
    pub async fn update_profile(&self, user_id: i32, update: &UpdateProfile) -> AppResult<User> {
        update.validate()?;

        let user = self.repository.users.get_by_id(user_id).await?;

        let password_hash = match update.new_password {
            Some(ref new_password) => {
                let current = update.current_password.as_deref().ok_or_else(|| {
                    AppError::Validation("Current password is required to set a new one".to_string())
                })?;
                if !verify_password(current, &user.password)? {
                    return Err(AppError::Authentication("Current password is incorrect".to_string()));
                }
                Some(hash_password(new_password)?)
            }
            None => None,
        };

        let metadata = update.merged_metadata(&user.metadata);
        let user = self
            .repository
            .users
            .update_profile(
                user_id,
                update.name.as_deref().map(str::trim),
                &metadata,
                password_hash.as_deref(),
            )
            .await?;

        if password_hash.is_some() {
            tracing::info!(user_id, "Password changed");
        }
        Ok(user)
    }

    /// Change a user's role (admin only). Admins cannot demote themselves.
    pub async fn update_role(&self, actor_id: i32, id: i32, role: Role) -> AppResult<User> {
        if actor_id == id && role != Role::Admin {
            return Err(AppError::BusinessRule("Administrators cannot demote themselves".to_string()));
        }
        let user = self.repository.users.update_role(id, role).await?;
        tracing::info!(actor_id, user_id = id, role = %role, "User role changed");
        Ok(user)
    }

    /// Activate or deactivate an account. Users are never hard-deleted.
    pub async fn set_active(&self, actor_id: i32, id: i32, is_active: bool) -> AppResult<User> {
        if actor_id == id && !is_active {
            return Err(AppError::BusinessRule(
                "Administrators cannot deactivate themselves".to_string(),
            ));
        }
        let user = self.repository.users.set_active(id, is_active).await?;
        tracing::info!(actor_id, user_id = id, is_active, "User status changed");
        Ok(user)
    }

    /// Mark an account verified without an OTP
    pub async fn approve(&self, actor_id: i32, id: i32) -> AppResult<User> {
        let user = self.repository.users.set_verified(id, true).await?;
        tracing::info!(actor_id, user_id = id, "User approved");
        Ok(user)
    }

    /// Create the configured administrator if the database has none
    pub async fn ensure_admin(&self, config: &AdminConfig) -> AppResult<Option<User>> {
        if self.repository.users.admin_exists().await? {
            return Ok(None);
        }

        let (Some(email), Some(password)) = (config.email.as_deref(), config.password.as_deref()) else {
            tracing::warn!("No administrator exists and none is configured (ADMIN_EMAIL / ADMIN_PASSWORD)");
            return Ok(None);
        };

        let email = normalize_email(email);
        if let Some(existing) = self.repository.users.get_by_email(&email).await? {
            let user = self.repository.users.update_role(existing.id, Role::Admin).await?;
            let user = self.repository.users.set_verified(user.id, true).await?;
            tracing::info!(user_id = user.id, "Promoted existing account to administrator");
            return Ok(Some(user));
        }

        let user = self
            .repository
            .users
            .create(&CreateUser {
                email,
                name: config.name.clone().unwrap_or_else(|| "Administrator".to_string()),
                password_hash: hash_password(password)?,
                role: Role::Admin,
                is_verified: true,
            })
            .await?;

        tracing::info!(user_id = user.id, "Bootstrap administrator created");
        Ok(Some(user))
    }
}
