//! `MailService` over IMAP + SMTP.
//!
//! Each call opens its own session inside `spawn_blocking`; no connection is
//! held between cycles.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::auth::OAuthClient;
use crate::config::MailConfig;
use crate::error::{AuthError, MailError};
use crate::mail::imap::{self, Login};
use crate::mail::message::Message;
use crate::mail::{MailService, smtp};

/// How the adapter authenticates.
#[derive(Clone)]
pub enum MailAuth {
    Password(SecretString),
    OAuth(Arc<OAuthClient>),
}

pub struct ImapMailService {
    config: MailConfig,
    auth: MailAuth,
}

impl ImapMailService {
    pub fn new(config: MailConfig, auth: MailAuth) -> Self {
        Self { config, auth }
    }

    /// Resolve credentials for one session, refreshing the OAuth token if needed.
    async fn login(&self) -> Result<Login, MailError> {
        let username = self.config.username.clone();
        match &self.auth {
            MailAuth::Password(password) => Ok(Login::Password {
                username,
                password: password.expose_secret().to_string(),
            }),
            MailAuth::OAuth(client) => {
                let access_token = client.access_token().await.map_err(|e| match e {
                    AuthError::NotAuthorized => MailError::NotAuthorized(e.to_string()),
                    other => MailError::AuthFailed {
                        user: username.clone(),
                        reason: other.to_string(),
                    },
                })?;
                Ok(Login::XOAuth2 {
                    username,
                    access_token,
                })
            }
        }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, MailError>
    where
        T: Send + 'static,
        F: FnOnce(MailConfig, Login) -> Result<T, MailError> + Send + 'static,
    {
        let login = self.login().await?;
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || f(config, login))
            .await
            .map_err(|e| MailError::Task(e.to_string()))?
    }
}

#[async_trait]
impl MailService for ImapMailService {
    async fn fetch_unread(&self) -> Result<Vec<Message>, MailError> {
        self.blocking(|config, login| imap::fetch_unseen(&config, &login))
            .await
    }

    async fn send_forward(&self, original: &Message, to_email: &str) -> Result<(), MailError> {
        let original = original.clone();
        let to = to_email.to_string();
        self.blocking(move |config, login| smtp::send_forward(&config, &login, &original, &to))
            .await
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), MailError> {
        let uid = message_id.to_string();
        self.blocking(move |config, login| imap::mark_seen(&config, &login, &uid))
            .await
    }
}
