//! OAuth2 authorization-code client for mailbox access.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::auth::OAuthCallback;
use crate::auth::token::{StoredToken, TokenResponse};
use crate::error::AuthError;

/// Full IMAP/SMTP access; required for XOAUTH2.
pub const MAIL_SCOPE: &str = "https://mail.google.com/";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// One section of a client-secret file.
#[derive(Debug, Deserialize)]
struct RawSecret {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    auth_uri: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<RawSecret>,
    web: Option<RawSecret>,
}

/// Client registration read from the credentials file.
#[derive(Debug, Clone)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: SecretString,
    pub auth_uri: String,
    pub token_uri: String,
}

impl ClientSecret {
    /// Parse a client-secret JSON document with an `installed` or `web` section.
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        let file: CredentialsFile = serde_json::from_str(json)
            .map_err(|e| AuthError::InvalidCredentials(e.to_string()))?;
        let raw = file.installed.or(file.web).ok_or_else(|| {
            AuthError::InvalidCredentials("expected an \"installed\" or \"web\" section".into())
        })?;
        if raw.client_id.trim().is_empty() {
            return Err(AuthError::InvalidCredentials("client_id is empty".into()));
        }

        Ok(Self {
            client_id: raw.client_id,
            client_secret: SecretString::from(raw.client_secret),
            auth_uri: raw.auth_uri.unwrap_or_else(|| DEFAULT_AUTH_URI.into()),
            token_uri: raw.token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.into()),
        })
    }
}

/// Authorization-code client holding the current token.
pub struct OAuthClient {
    secret: ClientSecret,
    token_file: PathBuf,
    redirect_uri: String,
    state: String,
    http: reqwest::Client,
    token: Mutex<Option<StoredToken>>,
}

impl OAuthClient {
    pub fn new(secret: ClientSecret, token_file: PathBuf, redirect_uri: String) -> Result<Self, AuthError> {
        let token = StoredToken::load(&token_file)?;
        if token.is_some() {
            debug!(path = %token_file.display(), "Loaded stored OAuth token");
        }
        Ok(Self {
            secret,
            token_file,
            redirect_uri,
            state: uuid::Uuid::new_v4().to_string(),
            http: reqwest::Client::new(),
            token: Mutex::new(token),
        })
    }

    /// Read the credentials file and any stored token.
    pub fn from_files(
        credentials_file: &Path,
        token_file: &Path,
        redirect_uri: &str,
    ) -> Result<Self, AuthError> {
        let json = std::fs::read_to_string(credentials_file).map_err(|e| {
            AuthError::InvalidCredentials(format!("{}: {e}", credentials_file.display()))
        })?;
        Self::new(
            ClientSecret::from_json(&json)?,
            token_file.to_path_buf(),
            redirect_uri.to_string(),
        )
    }

    /// Whether a token (valid or refreshable) is held.
    pub async fn has_token(&self) -> bool {
        self.token.lock().await.is_some()
    }

    /// Consent URL the operator opens to grant access.
    pub fn authorization_url(&self) -> String {
        let params = [
            ("client_id", self.secret.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", MAIL_SCOPE),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", self.state.as_str()),
        ];
        match reqwest::Url::parse_with_params(&self.secret.auth_uri, &params) {
            Ok(url) => url.to_string(),
            // auth_uri comes from the credentials file; fall back to the default endpoint.
            Err(_) => reqwest::Url::parse_with_params(DEFAULT_AUTH_URI, &params)
                .map(|u| u.to_string())
                .unwrap_or_default(),
        }
    }

    /// Exchange an authorization code and persist the resulting token.
    pub async fn complete(&self, code: &str, state: &str) -> Result<(), AuthError> {
        if state != self.state {
            return Err(AuthError::StateMismatch);
        }

        let response = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .await
            .map_err(AuthError::Exchange)?;

        let mut guard = self.token.lock().await;
        let previous = guard.as_ref().and_then(|t| t.refresh_token.clone());
        let token = StoredToken::from_response(response, previous, Utc::now());
        token.save(&self.token_file)?;
        *guard = Some(token);

        info!(path = %self.token_file.display(), "OAuth authorization complete");
        Ok(())
    }

    /// Current access token, refreshed when close to expiry.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let mut guard = self.token.lock().await;
        let Some(current) = guard.as_ref() else {
            return Err(AuthError::NotAuthorized);
        };

        if current.is_valid_at(Utc::now()) {
            return Ok(current.access_token.clone());
        }

        let Some(refresh_token) = current.refresh_token.clone() else {
            return Err(AuthError::NotAuthorized);
        };

        debug!("Refreshing OAuth access token");
        let response = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .await
            .map_err(AuthError::Refresh)?;

        let token = StoredToken::from_response(response, Some(refresh_token), Utc::now());
        token.save(&self.token_file)?;
        let access = token.access_token.clone();
        *guard = Some(token);
        Ok(access)
    }

    /// POST a grant to the token endpoint. Errors are rendered to strings so
    /// the caller can tag them as exchange or refresh failures.
    async fn request_token(&self, grant: &[(&str, &str)]) -> Result<TokenResponse, String> {
        let mut form: Vec<(&str, &str)> = vec![
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.expose_secret()),
        ];
        form.extend_from_slice(grant);

        let response = self
            .http
            .post(&self.secret.token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{status}: {body}"));
        }
        response.json::<TokenResponse>().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl OAuthCallback for OAuthClient {
    fn authorization_url(&self) -> String {
        OAuthClient::authorization_url(self)
    }

    async fn complete(&self, code: &str, state: &str) -> Result<(), AuthError> {
        OAuthClient::complete(self, code, state).await
    }
}
