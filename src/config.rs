//! Configuration types, built from environment variables.
//!
//! Every `from_env()` has a `from_lookup()` twin taking a key → value
//! function, so tests can feed a map instead of touching the process env.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::logging::{LogFormat, LoggingConfig};

/// Default trigger: one polling cycle per minute.
pub const DEFAULT_TRIGGER: &str = "@every 1m";

/// Forwarding schedule and keyword allow-list. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// `@every <duration>` or a cron expression with a seconds field.
    pub trigger: String,
    /// Keywords eligible for forwarding (membership test only).
    pub allowed_keywords: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            trigger: DEFAULT_TRIGGER.to_string(),
            allowed_keywords: Vec::new(),
        }
    }
}

/// IMAP/SMTP mailbox settings.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    /// Absent when the mailbox is accessed with OAuth.
    pub password: Option<SecretString>,
    pub from_address: String,
    pub mailbox: String,
    pub io_timeout_secs: u64,
}

/// OAuth client settings. Present only when a credentials file is configured.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub credentials_file: PathBuf,
    pub token_file: PathBuf,
    pub redirect_uri: String,
}

/// Everything `main` needs to assemble the service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub mail: MailConfig,
    pub oauth: Option<OAuthConfig>,
    pub db_path: PathBuf,
    /// `(name, email)` pairs upserted into the target store on boot.
    pub seed_targets: Vec<(String, String)>,
    pub server_addr: String,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let scheduler = SchedulerConfig {
            trigger: non_empty(&lookup, "FORWARD_TRIGGER")
                .unwrap_or_else(|| DEFAULT_TRIGGER.to_string()),
            allowed_keywords: parse_list(&lookup("FORWARD_ALLOWED_KEYWORDS").unwrap_or_default()),
        };

        let server_addr =
            non_empty(&lookup, "FORWARD_SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:8080".into());

        let oauth = non_empty(&lookup, "OAUTH_CREDENTIALS_FILE").map(|credentials_file| OAuthConfig {
            credentials_file: PathBuf::from(credentials_file),
            token_file: non_empty(&lookup, "OAUTH_TOKEN_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/token.json")),
            redirect_uri: non_empty(&lookup, "OAUTH_REDIRECT_URI")
                .unwrap_or_else(|| format!("http://{server_addr}/api/v1/oauth/callback")),
        });

        let mail = MailConfig::from_lookup(&lookup)?;
        if mail.password.is_none() && oauth.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "MAIL_PASSWORD".into(),
                hint: "Set MAIL_PASSWORD or OAUTH_CREDENTIALS_FILE".into(),
            });
        }

        let format = match non_empty(&lookup, "LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>().map_err(|message| ConfigError::InvalidValue {
                key: "LOG_FORMAT".into(),
                message,
            })?,
            None => LogFormat::default(),
        };
        let logging = LoggingConfig {
            format,
            directory: non_empty(&lookup, "LOG_DIR").map(PathBuf::from),
            ..LoggingConfig::default()
        };

        Ok(Self {
            scheduler,
            mail,
            oauth,
            db_path: non_empty(&lookup, "FORWARD_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/mail-forward.db")),
            seed_targets: parse_targets(&lookup("FORWARD_TARGETS").unwrap_or_default())?,
            server_addr,
            logging,
        })
    }
}

impl MailConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let imap_host = non_empty(lookup, "MAIL_IMAP_HOST")
            .ok_or_else(|| ConfigError::MissingEnvVar("MAIL_IMAP_HOST".into()))?;
        let username = non_empty(lookup, "MAIL_USERNAME")
            .ok_or_else(|| ConfigError::MissingEnvVar("MAIL_USERNAME".into()))?;

        let smtp_host =
            non_empty(lookup, "MAIL_SMTP_HOST").unwrap_or_else(|| imap_host.replace("imap", "smtp"));

        Ok(Self {
            imap_port: parse_number(lookup, "MAIL_IMAP_PORT", 993)?,
            smtp_port: parse_number(lookup, "MAIL_SMTP_PORT", 587)?,
            password: non_empty(lookup, "MAIL_PASSWORD").map(SecretString::from),
            from_address: non_empty(lookup, "MAIL_FROM_ADDRESS").unwrap_or_else(|| username.clone()),
            mailbox: non_empty(lookup, "MAIL_MAILBOX").unwrap_or_else(|| "INBOX".into()),
            io_timeout_secs: parse_number(lookup, "MAIL_IO_TIMEOUT_SECS", 30)?,
            imap_host,
            smtp_host,
            username,
        })
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match non_empty(lookup, key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.into(),
            message: format!("{raw:?}: {e}"),
        }),
        None => Ok(default),
    }
}

/// Split a comma-separated list, trimming entries and dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `name=email,name=email` pairs.
pub fn parse_targets(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    parse_list(raw)
        .into_iter()
        .map(|entry| {
            let (name, email) = entry
                .split_once('=')
                .map(|(n, e)| (n.trim(), e.trim()))
                .filter(|(n, e)| !n.is_empty() && !e.is_empty())
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "FORWARD_TARGETS".into(),
                    message: format!("expected name=email, got {entry:?}"),
                })?;
            Ok((name.to_string(), email.to_string()))
        })
        .collect()
}
