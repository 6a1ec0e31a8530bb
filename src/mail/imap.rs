//! Minimal blocking IMAP client over TLS, just enough for unread scanning.
//!
//! Commands used: LOGIN / AUTHENTICATE XOAUTH2, SELECT, UID SEARCH UNSEEN,
//! UID FETCH (BODY.PEEK[]), UID STORE +FLAGS.SILENT (\Seen), LOGOUT.
//! Everything here blocks; callers run it inside `spawn_blocking`.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rustls_pki_types::ServerName;
use tracing::{debug, warn};

use crate::config::MailConfig;
use crate::error::MailError;
use crate::mail::message::Message;

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Largest literal accepted from the server (one raw message).
pub const MAX_LITERAL_BYTES: usize = 50 * 1024 * 1024;

/// Credentials resolved for one IMAP/SMTP session.
#[derive(Clone)]
pub enum Login {
    Password { username: String, password: String },
    XOAuth2 { username: String, access_token: String },
}

impl Login {
    pub fn username(&self) -> &str {
        match self {
            Login::Password { username, .. } | Login::XOAuth2 { username, .. } => username,
        }
    }
}

impl std::fmt::Debug for Login {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Login::Password { .. } => "password",
            Login::XOAuth2 { .. } => "xoauth2",
        };
        f.debug_struct("Login")
            .field("username", &self.username())
            .field("kind", &kind)
            .finish()
    }
}

/// Tagged response to one command: untagged lines plus any literals.
#[derive(Debug, Default)]
pub struct Response {
    pub lines: Vec<String>,
    pub literals: Vec<Vec<u8>>,
}

/// An authenticated-or-not IMAP connection.
pub struct ImapSession {
    stream: BufReader<TlsStream>,
    host: String,
    next_tag: u32,
}

impl ImapSession {
    /// Connect with implicit TLS and read the server greeting.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, MailError> {
        let connection_err = |reason: String| MailError::Connection {
            host: format!("{host}:{port}"),
            reason,
        };

        let tcp = TcpStream::connect((host, port)).map_err(|e| connection_err(e.to_string()))?;
        tcp.set_read_timeout(Some(timeout))?;
        tcp.set_write_timeout(Some(timeout))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| connection_err(format!("invalid server name: {e}")))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| connection_err(format!("TLS setup failed: {e}")))?;

        let mut session = Self {
            stream: BufReader::new(rustls::StreamOwned::new(conn, tcp)),
            host: host.to_string(),
            next_tag: 1,
        };

        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(MailError::Protocol(format!(
                "unexpected greeting: {}",
                greeting.trim_end()
            )));
        }
        debug!(host = %session.host, "IMAP connected");
        Ok(session)
    }

    /// Authenticate with password LOGIN or SASL XOAUTH2.
    pub fn login(&mut self, login: &Login) -> Result<(), MailError> {
        let result = match login {
            Login::Password { username, password } => {
                self.command(&format!("LOGIN {} {}", quote(username), quote(password)))
            }
            Login::XOAuth2 {
                username,
                access_token,
            } => self.command(&format!(
                "AUTHENTICATE XOAUTH2 {}",
                xoauth2_payload(username, access_token)
            )),
        };

        result.map(|_| ()).map_err(|e| MailError::AuthFailed {
            user: login.username().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn select(&mut self, mailbox: &str) -> Result<(), MailError> {
        self.command(&format!("SELECT {}", quote(mailbox)))?;
        Ok(())
    }

    /// UIDs of all messages without the `\Seen` flag.
    pub fn search_unseen(&mut self) -> Result<Vec<String>, MailError> {
        let response = self.command("UID SEARCH UNSEEN")?;
        Ok(parse_search_response(&response.lines))
    }

    /// Raw RFC 822 bytes of one message. `BODY.PEEK` leaves `\Seen` untouched.
    pub fn fetch_raw(&mut self, uid: &str) -> Result<Vec<u8>, MailError> {
        let response = self.command(&format!("UID FETCH {uid} (BODY.PEEK[])"))?;
        response
            .literals
            .into_iter()
            .next()
            .ok_or_else(|| MailError::Protocol(format!("no message body returned for UID {uid}")))
    }

    pub fn mark_seen(&mut self, uid: &str) -> Result<(), MailError> {
        self.command(&format!("UID STORE {uid} +FLAGS.SILENT (\\Seen)"))?;
        Ok(())
    }

    pub fn logout(mut self) {
        if let Err(e) = self.command("LOGOUT") {
            debug!(host = %self.host, "IMAP logout failed: {e}");
        }
    }

    /// Send a tagged command and collect the response up to its tagged status.
    pub fn command(&mut self, command: &str) -> Result<Response, MailError> {
        let tag = format!("A{:04}", self.next_tag);
        self.next_tag += 1;

        let stream = self.stream.get_mut();
        stream.write_all(format!("{tag} {command}\r\n").as_bytes())?;
        stream.flush()?;

        let mut response = Response::default();
        loop {
            let line = self.read_line()?;

            if let Some(status) = line.strip_prefix(&tag) {
                let status = status.trim();
                if status.starts_with("OK") {
                    return Ok(response);
                }
                return Err(MailError::Protocol(format!(
                    "{} failed: {status}",
                    command_name(command)
                )));
            }

            // SASL continuation (e.g. XOAUTH2 error details): answer empty to
            // get the tagged NO.
            if line.starts_with('+') {
                let stream = self.stream.get_mut();
                stream.write_all(b"\r\n")?;
                stream.flush()?;
                continue;
            }

            if let Some(len) = literal_len(&line) {
                let len = check_literal_len(len)?;
                response.literals.push(self.read_exact(len)?);
            }
            response.lines.push(line);
        }
    }

    fn read_line(&mut self) -> Result<String, MailError> {
        let mut buf = Vec::new();
        let n = self.stream.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(MailError::Connection {
                host: self.host.clone(),
                reason: "connection closed".into(),
            });
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, MailError> {
        let mut buf = Vec::with_capacity(len);
        let read = (&mut self.stream).take(len as u64).read_to_end(&mut buf)?;
        if read < len {
            return Err(MailError::Connection {
                host: self.host.clone(),
                reason: format!("connection closed after {read} of {len} literal bytes"),
            });
        }
        Ok(buf)
    }
}

/// Open a session, authenticate, and select the configured mailbox.
pub fn open(config: &MailConfig, login: &Login) -> Result<ImapSession, MailError> {
    let mut session = ImapSession::connect(
        &config.imap_host,
        config.imap_port,
        Duration::from_secs(config.io_timeout_secs),
    )?;
    session.login(login)?;
    session.select(&config.mailbox)?;
    Ok(session)
}

/// Fetch every unseen message in the configured mailbox, oldest UID first.
///
/// Messages that fail to download or parse are skipped; connection, login,
/// select and search failures fail the whole call.
pub fn fetch_unseen(config: &MailConfig, login: &Login) -> Result<Vec<Message>, MailError> {
    let mut session = open(config, login)?;
    let uids = session.search_unseen()?;

    let mut messages = Vec::with_capacity(uids.len());
    for uid in &uids {
        let raw = match session.fetch_raw(uid) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(uid = %uid, "Failed to fetch message: {e}");
                continue;
            }
        };
        match Message::from_rfc822(uid.as_str(), &raw) {
            Some(message) => messages.push(message),
            None => warn!(uid = %uid, "Skipping unparseable message"),
        }
    }

    session.logout();
    debug!("Fetched {} unseen message(s)", messages.len());
    Ok(messages)
}

/// Set `\Seen` on one message.
pub fn mark_seen(config: &MailConfig, login: &Login, uid: &str) -> Result<(), MailError> {
    let mut session = open(config, login)?;
    session.mark_seen(uid)?;
    session.logout();
    Ok(())
}

// ── Protocol helpers (public for testing) ───────────────────────────

/// Length of a trailing `{N}` literal marker, if present.
pub fn literal_len(line: &str) -> Option<usize> {
    let trimmed = line.trim_end();
    let inner = trimmed.strip_suffix('}')?;
    let start = inner.rfind('{')?;
    inner[start + 1..].parse().ok()
}

/// Reject literals larger than [`MAX_LITERAL_BYTES`] before allocating.
pub fn check_literal_len(len: usize) -> Result<usize, MailError> {
    if len > MAX_LITERAL_BYTES {
        return Err(MailError::Protocol(format!(
            "literal of {len} bytes exceeds limit of {MAX_LITERAL_BYTES}"
        )));
    }
    Ok(len)
}

/// Collect UIDs from `* SEARCH` lines.
pub fn parse_search_response(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace())
        .filter(|uid| uid.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

/// Quote an IMAP string argument.
pub fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Base64 SASL XOAUTH2 initial response.
pub fn xoauth2_payload(username: &str, access_token: &str) -> String {
    STANDARD.encode(format!("user={username}\x01auth=Bearer {access_token}\x01\x01"))
}

/// First word of a command, for error messages (never echoes credentials).
fn command_name(command: &str) -> &str {
    match command.split_whitespace().next() {
        Some("UID") => command.split_whitespace().nth(1).unwrap_or("UID"),
        Some(name) => name,
        None => command,
    }
}
