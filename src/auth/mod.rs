//! OAuth2 handshake for mailbox access.

pub mod oauth;
pub mod token;

use async_trait::async_trait;

use crate::error::AuthError;

pub use oauth::{ClientSecret, OAuthClient};
pub use token::StoredToken;

/// What the HTTP callback routes need from an OAuth client.
#[async_trait]
pub trait OAuthCallback: Send + Sync {
    /// Consent URL the operator opens in a browser.
    fn authorization_url(&self) -> String;

    /// Finish the handshake with the code and state from the redirect.
    async fn complete(&self, code: &str, state: &str) -> Result<(), AuthError>;
}
