//! User model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::enums::Role;
use crate::error::AppError;

/// Full user model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub name: String,
    /// Hashed password (argon2)
    #[serde(skip_serializing)]
    pub password: String,
    pub role: Role,
    pub is_verified: bool,
    pub is_active: bool,
    /// Free-form profile data (phone, address)
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload, password already hashed
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
    pub is_verified: bool,
}

/// User query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct UserQuery {
    pub role: Option<Role>,
    /// Matches name or email
    pub search: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Update own profile request
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProfile {
    #[validate(length(min = 1, max = 120, message = "Name must be 1-120 characters"))]
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// Current password (required to change password)
    pub current_password: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: Option<String>,
}

impl UpdateProfile {
    /// Merge the contact fields into an existing metadata document
    pub fn merged_metadata(&self, current: &serde_json::Value) -> serde_json::Value {
        let mut metadata = match current {
            serde_json::Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        if let Some(ref phone) = self.phone {
            metadata.insert("phone".to_string(), serde_json::Value::String(phone.clone()));
        }
        if let Some(ref address) = self.address {
            metadata.insert("address".to_string(), serde_json::Value::String(address.clone()));
        }
        serde_json::Value::Object(metadata)
    }
}

/// Update role request (admin only)
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRole {
    pub role: Role,
}

/// Activate / deactivate request (admin only)
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatus {
    pub is_active: bool,
}

/// Access tokens authenticate requests; refresh tokens only mint new pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT Claims for authenticated users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i32,
    pub role: Role,
    pub token_type: TokenType,
    /// Token id, used to track and revoke refresh tokens
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
    /// Issue time in milliseconds; revocation cutoffs compare against this
    #[serde(default)]
    pub iat_ms: i64,
}

impl UserClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Require one of the given roles
    pub fn require_roles(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Authorization(format!(
                "Role {} is not allowed to perform this action",
                self.role
            )))
        }
    }

    pub fn require_staff(&self) -> Result<(), AppError> {
        self.require_roles(&[Role::Librarian, Role::Admin])
    }

    /// Require admin privileges
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Authorization("Administrator privileges required".to_string()))
        }
    }

    /// Owners see their own records, staff see everyone's
    pub fn require_self_or_staff(&self, owner_id: i32) -> Result<(), AppError> {
        if self.user_id == owner_id || self.is_staff() {
            Ok(())
        } else {
            Err(AppError::Authorization("Not allowed to access another user's records".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role, token_type: TokenType, exp_offset: i64) -> UserClaims {
        let now = Utc::now().timestamp();
        UserClaims {
            sub: "7".to_string(),
            user_id: 7,
            role,
            token_type,
            jti: "abc".to_string(),
            exp: now + exp_offset,
            iat: now,
            iat_ms: now * 1000,
        }
    }

    #[test]
    fn test_token_round_trip_keeps_role_and_type() {
        let token = claims(Role::Librarian, TokenType::Refresh, 600)
            .create_token("secret")
            .unwrap();
        let parsed = UserClaims::from_token(&token, "secret").unwrap();
        assert_eq!(parsed.role, Role::Librarian);
        assert_eq!(parsed.token_type, TokenType::Refresh);
        assert!(UserClaims::from_token(&token, "other-secret").is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let token = claims(Role::Student, TokenType::Access, -3600)
            .create_token("secret")
            .unwrap();
        assert!(UserClaims::from_token(&token, "secret").is_err());
    }

    #[test]
    fn test_role_guards() {
        let student = claims(Role::Student, TokenType::Access, 600);
        assert!(student.require_staff().is_err());
        assert!(student.require_roles(&[Role::Student, Role::Teacher]).is_ok());
        assert!(student.require_self_or_staff(7).is_ok());
        assert!(student.require_self_or_staff(8).is_err());

        let librarian = claims(Role::Librarian, TokenType::Access, 600);
        assert!(librarian.require_staff().is_ok());
        assert!(librarian.require_admin().is_err());
        assert!(librarian.require_self_or_staff(8).is_ok());
    }

    #[test]
    fn test_profile_metadata_merge_keeps_unknown_keys() {
        let current = serde_json::json!({ "phone": "1", "locker": 12 });
        let update = UpdateProfile {
            address: Some("1 Main St".to_string()),
            ..Default::default()
        };
        let merged = update.merged_metadata(&current);
        assert_eq!(merged["phone"], "1");
        assert_eq!(merged["locker"], 12);
        assert_eq!(merged["address"], "1 Main St");
    }
}
