//! Error types for mail-forward, one enum per concern.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Mailbox access errors (IMAP fetch/flag, SMTP send).
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    #[error("Authentication failed for {user}: {reason}")]
    AuthFailed { user: String, reason: String },

    #[error("Mail client not authorized: {0}")]
    NotAuthorized(String),

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("Invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to send forward: {0}")]
    SendFailed(String),

    #[error("Mail task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Forward target resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("No forward target named {name:?}")]
    NotFound { name: String },

    #[error("Target lookup failed: {0}")]
    Lookup(#[from] DatabaseError),
}

/// OAuth handshake and token errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid OAuth credentials file: {0}")]
    InvalidCredentials(String),

    #[error("Not authorized yet; visit the authorization URL to grant access")]
    NotAuthorized,

    #[error("OAuth state mismatch")]
    StateMismatch,

    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("Token refresh failed: {0}")]
    Refresh(String),

    #[error("Token storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Scheduler lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid trigger expression {expression:?}: {reason}")]
    InvalidTrigger { expression: String, reason: String },

    #[error("Scheduler is {state}, cannot transition to {target}")]
    InvalidTransition { state: String, target: String },

    #[error("Scheduler task failed: {0}")]
    Join(String),
}

/// HTTP API server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("Server did not shut down within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("Server task failed: {0}")]
    Join(String),
}
