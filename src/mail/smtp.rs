//! Outbound forwarding over SMTP via lettre.

use std::time::Duration;

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{Message as Email, SmtpTransport, Transport};
use tracing::info;

use crate::config::MailConfig;
use crate::error::MailError;
use crate::mail::imap::Login;
use crate::mail::message::Message;

/// Port on which SMTP speaks TLS from the first byte; everything else upgrades.
const IMPLICIT_TLS_PORT: u16 = 465;

pub fn forward_subject(original: &Message) -> String {
    format!("Fwd: {}", original.subject)
}

/// Forwarded body: a header block quoting the original, then its text.
pub fn forward_body(original: &Message) -> String {
    format!(
        "---------- Forwarded message ----------\n\
         From: {}\n\
         Date: {}\n\
         Subject: {}\n\
         \n\
         {}",
        original.from, original.date, original.subject, original.body
    )
}

/// Compose the forward of `original` addressed to `to`.
pub fn build_forward(from: &str, original: &Message, to: &str) -> Result<Email, MailError> {
    let to = to.trim();
    if to.is_empty() {
        return Err(MailError::InvalidAddress {
            address: String::new(),
            reason: "empty target address".into(),
        });
    }

    let from: Mailbox = from.parse().map_err(|e| MailError::InvalidAddress {
        address: from.to_string(),
        reason: format!("{e}"),
    })?;
    let to: Mailbox = to.parse().map_err(|e| MailError::InvalidAddress {
        address: to.to_string(),
        reason: format!("{e}"),
    })?;

    Email::builder()
        .from(from)
        .to(to)
        .subject(forward_subject(original))
        .header(ContentType::TEXT_PLAIN)
        .body(forward_body(original))
        .map_err(|e| MailError::SendFailed(format!("Failed to build email: {e}")))
}

/// Send the forward. Blocking; run inside `spawn_blocking`.
pub fn send_forward(
    config: &MailConfig,
    login: &Login,
    original: &Message,
    to: &str,
) -> Result<(), MailError> {
    let email = build_forward(&config.from_address, original, to)?;

    let builder = if config.smtp_port == IMPLICIT_TLS_PORT {
        SmtpTransport::relay(&config.smtp_host)
    } else {
        SmtpTransport::starttls_relay(&config.smtp_host)
    }
    .map_err(|e| MailError::Connection {
        host: format!("{}:{}", config.smtp_host, config.smtp_port),
        reason: format!("SMTP relay error: {e}"),
    })?;

    let (credentials, mechanisms) = match login {
        Login::Password { username, password } => (
            Credentials::new(username.clone(), password.clone()),
            vec![Mechanism::Plain, Mechanism::Login],
        ),
        Login::XOAuth2 {
            username,
            access_token,
        } => (
            Credentials::new(username.clone(), access_token.clone()),
            vec![Mechanism::Xoauth2],
        ),
    };

    let transport = builder
        .port(config.smtp_port)
        .credentials(credentials)
        .authentication(mechanisms)
        .timeout(Some(Duration::from_secs(config.io_timeout_secs)))
        .build();

    transport
        .send(&email)
        .map_err(|e| MailError::SendFailed(format!("SMTP send failed: {e}")))?;

    info!(message_id = %original.id, to = %to.trim(), "Forward sent");
    Ok(())
}
