// SMTP Email Channel (password reset)

use crate::template::render_password_reset;
use async_trait::async_trait;
use herald_core::error::{AppError, Result};
use herald_core::port::{EmailChannel, PasswordResetVars, SendError};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const RESET_SUBJECT: &str = "Reset Your Password";

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Sender mailbox, e.g. `Herald <no-reply@example.com>`
    pub from: String,
    /// STARTTLS upgrade; disable only for local relays
    #[serde(default = "default_starttls")]
    pub starttls: bool,
    #[serde(default = "default_smtp_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_port() -> u16 {
    587
}

fn default_starttls() -> bool {
    true
}

fn default_smtp_timeout_ms() -> u64 {
    10_000
}

pub struct SmtpEmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailChannel {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| AppError::Config(format!("smtp.from '{}': {}", config.from, e)))?;

        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| AppError::Config(format!("smtp relay '{}': {}", config.host, e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_millis(config.timeout_ms)));
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, to: &str, vars: &PasswordResetVars) -> std::result::Result<Message, SendError> {
        let recipient: Mailbox = to
            .parse()
            .map_err(|e| SendError::InvalidRecipient(format!("{}: {}", to, e)))?;

        Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(RESET_SUBJECT)
            .header(ContentType::TEXT_HTML)
            .body(render_password_reset(vars))
            .map_err(|e| SendError::InvalidMessage(e.to_string()))
    }
}

/// SMTP verdicts: 4xx and connection problems are retryable, 55x rejects the mailbox
fn map_smtp_error(err: lettre::transport::smtp::Error) -> SendError {
    if !err.is_permanent() {
        return SendError::Transport(err.to_string());
    }

    let code = err.status().map(|c| c.to_string()).unwrap_or_default();
    match code.as_str() {
        "550" | "551" | "552" | "553" => SendError::InvalidRecipient(err.to_string()),
        _ => SendError::InvalidMessage(err.to_string()),
    }
}

#[async_trait]
impl EmailChannel for SmtpEmailChannel {
    async fn send(&self, to: &str, vars: &PasswordResetVars) -> std::result::Result<(), SendError> {
        let message = self.build_message(to, vars)?;

        let response = self.transport.send(message).await.map_err(map_smtp_error)?;
        debug!(code = %response.code(), "SMTP relay accepted message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SmtpConfig {
        SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            username: String::new(),
            password: String::new(),
            from: "Herald <no-reply@example.com>".to_string(),
            starttls: false,
            timeout_ms: 1_000,
        }
    }

    fn vars() -> PasswordResetVars {
        PasswordResetVars {
            full_name: "Ada".to_string(),
            url: "https://app.example.com/reset?t=abc".to_string(),
        }
    }

    #[test]
    fn test_invalid_sender_is_config_error() {
        let mut cfg = config();
        cfg.from = "not an address".to_string();
        assert!(matches!(SmtpEmailChannel::new(&cfg), Err(AppError::Config(_))));
    }

    #[test]
    fn test_build_message_headers() {
        let channel = SmtpEmailChannel::new(&config()).unwrap();
        let message = channel.build_message("ada@example.com", &vars()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: Reset Your Password"));
        assert!(raw.contains("To: ada@example.com"));
        assert!(raw.contains("Content-Type: text/html"));
    }

    #[tokio::test]
    async fn test_invalid_recipient_rejected_before_connect() {
        let channel = SmtpEmailChannel::new(&config()).unwrap();
        let err = channel.send("nobody", &vars()).await.unwrap_err();
        assert!(matches!(err, SendError::InvalidRecipient(_)));
    }
}
