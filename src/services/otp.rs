//! Email one-time codes for verification and password reset

use std::sync::Arc;

use rand::Rng;
use sha2::{Digest, Sha256};

use super::token_store::TokenStore;
use crate::error::{AppError, AppResult};

pub const OTP_DIGITS: usize = 4;

/// What an OTP unlocks; codes for one purpose never satisfy another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    VerifyEmail,
    ResetPassword,
}

impl OtpPurpose {
    fn key_prefix(&self) -> &'static str {
        match self {
            OtpPurpose::VerifyEmail => "verify",
            OtpPurpose::ResetPassword => "reset",
        }
    }

    fn code_key(&self, user_id: i32) -> String {
        format!("otp:{}:{}", self.key_prefix(), user_id)
    }

    fn attempts_key(&self, user_id: i32) -> String {
        format!("otp_attempts:{}:{}", self.key_prefix(), user_id)
    }
}

/// Random zero-padded numeric code
pub fn generate_code() -> String {
    let max = 10u32.pow(OTP_DIGITS as u32);
    format!("{:0width$}", rand::thread_rng().gen_range(0..max), width = OTP_DIGITS)
}

/// Codes are kept hashed so a store dump does not reveal them
pub fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.trim().as_bytes()))
}

#[derive(Clone)]
pub struct OtpService {
    store: Arc<dyn TokenStore>,
    ttl_seconds: u64,
    max_attempts: u32,
}

impl OtpService {
    pub fn new(store: Arc<dyn TokenStore>, ttl_minutes: u64, max_attempts: u32) -> Self {
        Self {
            store,
            ttl_seconds: ttl_minutes * 60,
            max_attempts,
        }
    }

    pub fn ttl_minutes(&self) -> u64 {
        self.ttl_seconds / 60
    }

    /// Issue a fresh code, replacing any previous one for the same purpose
    pub async fn issue(&self, purpose: OtpPurpose, user_id: i32) -> AppResult<String> {
        let code = generate_code();
        self.store
            .set(&purpose.code_key(user_id), &hash_code(&code), self.ttl_seconds)
            .await?;
        self.store.delete(&purpose.attempts_key(user_id)).await?;
        Ok(code)
    }

    /// Check and consume a code. A code is burned after too many wrong guesses.
    pub async fn verify(&self, purpose: OtpPurpose, user_id: i32, code: &str) -> AppResult<()> {
        let code_key = purpose.code_key(user_id);
        let attempts_key = purpose.attempts_key(user_id);

        let stored = self
            .store
            .get(&code_key)
            .await?
            .ok_or_else(|| AppError::Validation("Invalid or expired code".to_string()))?;

        if stored == hash_code(code) {
            // only the request that removes the code gets to use it
            let consumed = self.store.delete(&code_key).await?;
            self.store.delete(&attempts_key).await?;
            if !consumed {
                return Err(AppError::Validation("Invalid or expired code".to_string()));
            }
            return Ok(());
        }

        let attempts = self.store.incr(&attempts_key, self.ttl_seconds).await?;
        if attempts >= self.max_attempts as i64 {
            self.store.delete(&code_key).await?;
            self.store.delete(&attempts_key).await?;
            tracing::warn!(user_id, ?purpose, "OTP burned after too many attempts");
            return Err(AppError::Validation(
                "Too many attempts, please request a new code".to_string(),
            ));
        }

        Err(AppError::Validation("Invalid or expired code".to_string()))
    }
}
