//! Email transport — SMTP via lettre for outbound, raw IMAP over rustls for
//! inbound task emails.

use std::io::Write as IoWrite;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use mail_parser::{MessageParser, MimeHeaders};
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channels::channel::{InboundChannel, MessageTransport};
use crate::channels::email_types::{
    InboundEmail, OutboundEmail, extract_addresses, strip_quoted_text,
};
use crate::config::{MailboxConfig, SmtpConfig};
use crate::error::ChannelError;

// ── SMTP ────────────────────────────────────────────────────────────

/// Outbound mail over an authenticated STARTTLS relay.
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Send synchronously (blocking — run in spawn_blocking).
    fn send_blocking(config: &SmtpConfig, email: &OutboundEmail) -> Result<(), ChannelError> {
        let message = build_message(&config.from_address, email)?;

        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| send_failed(format!("SMTP relay error: {e}")))?
            .port(config.port)
            .credentials(creds)
            .build();

        transport
            .send(&message)
            .map_err(|e| send_failed(format!("SMTP send failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl MessageTransport for SmtpMailer {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, email: &OutboundEmail) -> Result<(), ChannelError> {
        let config = self.config.clone();
        let owned = email.clone();

        tokio::task::spawn_blocking(move || Self::send_blocking(&config, &owned))
            .await
            .map_err(|e| send_failed(format!("SMTP task panicked: {e}")))??;

        info!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }
}

/// Build a plain-text lettre message.
pub fn build_message(from: &str, email: &OutboundEmail) -> Result<Message, ChannelError> {
    Message::builder()
        .from(
            from.parse()
                .map_err(|e| send_failed(format!("Invalid from address: {e}")))?,
        )
        .to(email
            .to
            .parse()
            .map_err(|e| send_failed(format!("Invalid to address: {e}")))?)
        .subject(email.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(email.body.clone())
        .map_err(|e| send_failed(format!("Failed to build email: {e}")))
}

fn send_failed(reason: String) -> ChannelError {
    ChannelError::SendFailed {
        name: "smtp".into(),
        reason,
    }
}

// ── IMAP ────────────────────────────────────────────────────────────

/// Inbound task mailbox read over IMAPS.
pub struct ImapMailbox {
    config: MailboxConfig,
}

impl ImapMailbox {
    pub fn new(config: MailboxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl InboundChannel for ImapMailbox {
    fn name(&self) -> &str {
        "imap"
    }

    async fn fetch_unread_matching(
        &self,
        subject_filter: &str,
    ) -> Result<Vec<InboundEmail>, ChannelError> {
        let config = self.config.clone();
        let filter = subject_filter.to_string();

        let fetched =
            tokio::task::spawn_blocking(move || fetch_matching_imap(&config, &filter))
                .await
                .map_err(|e| fetch_failed(format!("IMAP task panicked: {e}")))?
                .map_err(|e| fetch_failed(e.to_string()))?;

        debug!(
            count = fetched.len(),
            host = %self.config.imap_host,
            "Fetched inbound task emails"
        );
        Ok(fetched)
    }
}

fn fetch_failed(reason: String) -> ChannelError {
    ChannelError::FetchFailed {
        name: "imap".into(),
        reason,
    }
}

// ── Helpers (public for testing) ────────────────────────────────────

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

/// Quote a string for use as an IMAP command argument.
pub fn imap_quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Message sequence numbers from the untagged `* SEARCH` response lines.
pub fn parse_search_response(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter(|line| line.starts_with("* SEARCH"))
        .flat_map(|line| line.split_whitespace().skip(2).map(str::to_string))
        .collect()
}

/// Raw message bytes from a `FETCH n RFC822` response.
///
/// The first line announces the literal size as `{n}`; exactly that many
/// bytes follow.
pub fn extract_literal(lines: &[String]) -> Option<Vec<u8>> {
    let header = lines.first()?;
    let open = header.rfind('{')?;
    let close = header[open..].find('}')? + open;
    let size: usize = header[open + 1..close].parse().ok()?;

    let rest: Vec<u8> = lines[1..].iter().flat_map(|l| l.bytes()).collect();
    Some(rest[..size.min(rest.len())].to_vec())
}

/// Readable text of a parsed message, quote-stripped.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return strip_quoted_text(&text);
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    for part in parsed.attachments() {
        let part: &mail_parser::MessagePart = part;
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            return text.to_string();
        }
    }
    String::new()
}

/// Turn a raw RFC822 message into an `InboundEmail`.
pub fn parse_inbound(raw: &[u8]) -> Option<InboundEmail> {
    let parsed = MessageParser::default().parse(raw)?;

    let from = extract_addresses(parsed.from())
        .into_iter()
        .next()
        .unwrap_or_else(|| "unknown".into());
    let received_at = parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now);

    Some(InboundEmail {
        message_id: parsed
            .message_id()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("gen-{}", Uuid::new_v4())),
        from,
        subject: parsed.subject().unwrap_or_default().to_string(),
        body: extract_text(&parsed),
        received_at,
    })
}

/// Error type for IMAP fetch operations.
type ImapError = Box<dyn std::error::Error + Send + Sync>;

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

fn read_line(tls: &mut TlsStream) -> Result<String, ImapError> {
    let mut buf = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        match std::io::Read::read(tls, &mut byte) {
            Ok(0) => return Err("IMAP connection closed".into()),
            Ok(_) => {
                buf.push(byte[0]);
                if buf.ends_with(b"\r\n") {
                    return Ok(String::from_utf8_lossy(&buf).to_string());
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn send_cmd(tls: &mut TlsStream, tag: &str, cmd: &str) -> Result<Vec<String>, ImapError> {
    IoWrite::write_all(tls, format!("{tag} {cmd}\r\n").as_bytes())?;
    IoWrite::flush(tls)?;
    let mut lines = Vec::new();
    loop {
        let line = read_line(tls)?;
        let done = line.starts_with(tag);
        lines.push(line);
        if done {
            return Ok(lines);
        }
    }
}

fn tagged_ok(lines: &[String]) -> bool {
    lines
        .last()
        .is_some_and(|l| l.split_whitespace().nth(1) == Some("OK"))
}

/// Fetch unseen messages matching `subject_filter` and mark each one
/// `\Seen` right after fetching it (blocking — run in spawn_blocking).
fn fetch_matching_imap(
    config: &MailboxConfig,
    subject_filter: &str,
) -> Result<Vec<InboundEmail>, ImapError> {
    let tcp = TcpStream::connect((config.imap_host.as_str(), config.imap_port))?;
    tcp.set_read_timeout(Some(Duration::from_secs(30)))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name = rustls_pki_types::ServerName::try_from(config.imap_host.clone())?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)?;
    let mut tls = rustls::StreamOwned::new(conn, tcp);

    let _greeting = read_line(&mut tls)?;

    let login = send_cmd(
        &mut tls,
        "A1",
        &format!(
            "LOGIN {} {}",
            imap_quote(&config.username),
            imap_quote(config.password.expose_secret())
        ),
    )?;
    if !tagged_ok(&login) {
        return Err("IMAP login failed".into());
    }

    let select = send_cmd(&mut tls, "A2", "SELECT \"INBOX\"")?;
    if !tagged_ok(&select) {
        return Err("IMAP SELECT INBOX failed".into());
    }

    let search = send_cmd(
        &mut tls,
        "A3",
        &format!("SEARCH UNSEEN SUBJECT {}", imap_quote(subject_filter)),
    )?;
    let ids = parse_search_response(&search);

    let mut results = Vec::new();
    let mut tag_counter = 4_u32;

    for id in &ids {
        let fetch_tag = format!("A{tag_counter}");
        tag_counter += 1;
        let fetch = send_cmd(&mut tls, &fetch_tag, &format!("FETCH {id} RFC822"))?;

        let store_tag = format!("A{tag_counter}");
        tag_counter += 1;
        if let Err(e) = send_cmd(&mut tls, &store_tag, &format!("STORE {id} +FLAGS (\\Seen)")) {
            warn!(id = %id, "Failed to mark message seen: {e}");
        }

        match extract_literal(&fetch).as_deref().and_then(parse_inbound) {
            Some(email) => results.push(email),
            None => warn!(id = %id, "Skipping unparseable message"),
        }
    }

    let logout_tag = format!("A{tag_counter}");
    let _ = send_cmd(&mut tls, &logout_tag, "LOGOUT");

    Ok(results)
}

#[cfg(test)]
#[path = "email_tests.rs"]
mod tests;
