//! OAuth token persistence.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Tokens are refreshed when they have less than this much validity left.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Token as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// `None` means the provider did not report an expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Token endpoint response (authorization_code and refresh_token grants).
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl StoredToken {
    /// Build from an endpoint response. Refresh grants usually omit the
    /// refresh token, so the previous one is carried over.
    pub fn from_response(
        response: TokenResponse,
        previous_refresh: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            refresh_token: response.refresh_token.or(previous_refresh),
            expiry: response.expires_in.map(|secs| now + Duration::seconds(secs)),
        }
    }

    /// Whether the access token can still be used at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_MARGIN_SECS) > now,
            None => !self.access_token.is_empty(),
        }
    }

    /// Load from `path`. A missing file is `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>, AuthError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Write to `path`, creating parent directories. Owner-only on Unix.
    pub fn save(&self, path: &Path) -> Result<(), AuthError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AuthError::Storage(format!("{}: {e}", parent.display())))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .map_err(|e| AuthError::Storage(format!("{}: {e}", path.display())))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| AuthError::Storage(format!("{}: {e}", path.display())))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expiry: Option<DateTime<Utc>>) -> StoredToken {
        StoredToken {
            access_token: "ya29.token".into(),
            token_type: "Bearer".into(),
            refresh_token: Some("1//refresh".into()),
            expiry,
        }
    }

    #[test]
    fn validity_window_respects_margin() {
        let now = Utc::now();
        assert!(token(Some(now + Duration::seconds(3600))).is_valid_at(now));
        assert!(!token(Some(now + Duration::seconds(30))).is_valid_at(now));
        assert!(!token(Some(now - Duration::seconds(1))).is_valid_at(now));
    }

    #[test]
    fn no_expiry_is_valid_when_present() {
        assert!(token(None).is_valid_at(Utc::now()));
        let mut empty = token(None);
        empty.access_token.clear();
        assert!(!empty.is_valid_at(Utc::now()));
    }

    #[test]
    fn refresh_response_keeps_previous_refresh_token() {
        let now = Utc::now();
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"new","expires_in":3599,"token_type":"Bearer"}"#)
                .unwrap();
        let t = StoredToken::from_response(response, Some("old-refresh".into()), now);
        assert_eq!(t.access_token, "new");
        assert_eq!(t.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(t.expiry, Some(now + Duration::seconds(3599)));
    }

    #[test]
    fn exchange_response_sets_refresh_token() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r","expires_in":10}"#,
        )
        .unwrap();
        let t = StoredToken::from_response(response, None, Utc::now());
        assert_eq!(t.refresh_token.as_deref(), Some("r"));
        assert_eq!(t.token_type, "Bearer");
    }

    #[test]
    fn missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StoredToken::load(&dir.path().join("token.json")).unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("token.json");
        let original = token(Some(Utc::now() + Duration::seconds(600)));

        original.save(&path).unwrap();
        let loaded = StoredToken::load(&path).unwrap().unwrap();
        assert_eq!(loaded, original);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(StoredToken::load(&path), Err(AuthError::Json(_))));
    }
}
