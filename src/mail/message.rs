//! Mailbox message model and RFC 822 conversion.

use mail_parser::MessageParser;
use serde::{Deserialize, Serialize};

/// One mailbox entry, as fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Provider identifier (IMAP UID for the IMAP adapter).
    pub id: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub body: String,
    /// Provider-formatted timestamp.
    pub date: String,
}

impl Message {
    /// Parse a raw RFC 822 message. Returns `None` if it cannot be parsed.
    pub fn from_rfc822(id: impl Into<String>, raw: &[u8]) -> Option<Self> {
        let parsed = MessageParser::default().parse(raw)?;

        Some(Self {
            id: id.into(),
            subject: parsed.subject().unwrap_or_default().to_string(),
            from: extract_sender(&parsed),
            to: extract_addresses(parsed.to()).join(", "),
            body: extract_text(&parsed),
            date: parsed.date().map(|d| d.to_rfc3339()).unwrap_or_default(),
        })
    }
}

/// `Name <addr>` when a display name is present, else the bare address.
fn extract_sender(parsed: &mail_parser::Message) -> String {
    let Some(addr) = parsed.from().and_then(|a| a.first()) else {
        return String::new();
    };
    match (addr.name(), addr.address()) {
        (Some(name), Some(address)) => format!("{name} <{address}>"),
        (None, Some(address)) => address.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => String::new(),
    }
}

/// Extract email addresses from an optional mail_parser Address field.
pub fn extract_addresses(addr: Option<&mail_parser::Address>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    match addr {
        mail_parser::Address::List(addrs) => addrs
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            })
            .collect(),
    }
}

/// Plain-text body, falling back to tag-stripped HTML.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    String::new()
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
