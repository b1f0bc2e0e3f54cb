//! Email service for OTP codes and circulation notices

use chrono::{DateTime, Utc};
use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};
use std::str::FromStr;

use crate::{
    config::EmailConfig,
    error::{AppError, AppResult},
    models::fine::Fine,
};

#[derive(Clone)]
pub struct EmailService {
    config: EmailConfig,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Send the registration verification code
    pub async fn send_verification_code(&self, to: &str, name: &str, code: &str, ttl_minutes: u64) -> AppResult<()> {
        let subject = "Verify your Librarium account";
        let body = format!(
            r#"
Hello {name},

Your verification code is: {code}

This code will expire in {ttl_minutes} minutes.

If you didn't create an account, please ignore this email.
"#
        );

        self.send_email(to, subject, &body).await
    }

    /// Send a password reset code
    pub async fn send_password_reset_code(&self, to: &str, name: &str, code: &str, ttl_minutes: u64) -> AppResult<()> {
        let subject = "Your Librarium password reset code";
        let body = format!(
            r#"
Hello {name},

Your password reset code is: {code}

This code will expire in {ttl_minutes} minutes and can only be used once.

If you didn't request a password reset, you can ignore this email.
"#
        );

        self.send_email(to, subject, &body).await
    }

    /// Remind a patron of an outstanding fine
    pub async fn send_fine_reminder(&self, to: &str, name: &str, fine: &Fine) -> AppResult<()> {
        let subject = "Reminder: you have an outstanding library fine";
        let due = fine
            .due_date
            .map(|d| format!("Please settle it by {}.", d.format("%Y-%m-%d")))
            .unwrap_or_else(|| "Please settle it at the circulation desk.".to_string());
        let body = format!(
            r#"
Hello {name},

Our records show an outstanding fine of ${amount} on your account.

Reason: {reason}

{due}
"#,
            amount = fine.amount,
            reason = fine.reason,
        );

        self.send_email(to, subject, &body).await
    }

    /// Tell a patron their reservation became a loan
    pub async fn send_reservation_fulfilled(
        &self,
        to: &str,
        name: &str,
        title: &str,
        due_date: DateTime<Utc>,
    ) -> AppResult<()> {
        let subject = "Your reservation is ready";
        let body = format!(
            r#"
Hello {name},

Your reservation for "{title}" has been approved and checked out to you.

Due date: {due}
"#,
            due = due_date.format("%Y-%m-%d"),
        );

        self.send_email(to, subject, &body).await
    }

    /// Generic email sending function
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        if !self.config.enabled {
            tracing::info!(to, subject, "Email delivery disabled, message not sent");
            tracing::debug!(to, body, "Suppressed email body");
            return Ok(());
        }

        let email = self.build_message(to, subject, body)?;
        let mailer = self.build_transport()?;

        // SmtpTransport blocks; keep it off the async workers
        tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::Internal(format!("Email task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Failed to send email: {}", e)))?;

        Ok(())
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> AppResult<Message> {
        let from_name = self.config.smtp_from_name.as_deref().unwrap_or("Librarium");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| AppError::Internal(format!("Invalid to address: {}", e)))?;

        Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(format!(
                                r#"<html><body><pre>{}</pre></body></html>"#,
                                body.replace('\n', "<br>")
                            )),
                    ),
            )
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))
    }

    fn build_transport(&self) -> AppResult<SmtpTransport> {
        let mailer_builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| AppError::Internal(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer_builder = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer_builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer_builder
        };

        Ok(mailer_builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_delivery_succeeds_without_smtp() {
        let service = EmailService::new(EmailConfig::default());
        assert!(service
            .send_verification_code("reader@example.org", "Reader", "1234", 10)
            .await
            .is_ok());
    }

    #[test]
    fn test_build_message_rejects_bad_address() {
        let service = EmailService::new(EmailConfig::default());
        assert!(service.build_message("not an address", "s", "b").is_err());
        assert!(service.build_message("reader@example.org", "s", "b").is_ok());
    }
}
