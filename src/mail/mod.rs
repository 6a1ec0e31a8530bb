//! Mailbox access: the capability the forwarding pipeline runs against.
//!
//! `MailService` is the seam between the pipeline and a concrete provider.
//! The shipped adapter (`ImapMailService`) fetches over IMAP and forwards over
//! SMTP; tests substitute hand-written stubs.

pub mod imap;
pub mod message;
pub mod service;
pub mod smtp;

use async_trait::async_trait;

use crate::error::MailError;
use crate::pipeline::routing::{self, RoutingInstruction};

pub use message::Message;
pub use service::{ImapMailService, MailAuth};

/// Operations the forwarding pipeline needs from a mailbox.
#[async_trait]
pub trait MailService: Send + Sync {
    /// List all unread messages, in provider order.
    async fn fetch_unread(&self) -> Result<Vec<Message>, MailError>;

    /// Extract the routing instruction from a subject line.
    ///
    /// Defaults to the built-in `keyword - target` parser.
    fn parse_subject(&self, subject: &str) -> RoutingInstruction {
        routing::parse(subject)
    }

    /// Forward `original` to `to_email`.
    async fn send_forward(&self, original: &Message, to_email: &str) -> Result<(), MailError>;

    /// Mark a message as read so it is not fetched again.
    async fn mark_read(&self, message_id: &str) -> Result<(), MailError>;
}
