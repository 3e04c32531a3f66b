// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound email for property inquiries.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `SMTP_HOST` | SMTP relay hostname | Mail disabled when unset |
//! | `SMTP_PORT` | SMTP port | `587` |
//! | `SMTP_USERNAME` / `SMTP_PASSWORD` | Credentials | Optional |
//! | `SMTP_FROM_ADDRESS` | Sender address | Mail disabled when unset |
//! | `SMTP_FROM_NAME` | Sender display name | `Realty Listings` |
//! | `SMTP_USE_TLS` | STARTTLS | `true` |

use std::sync::{Arc, Mutex};

use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::{parse_or, ConfigError};

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("invalid email address: {0}")]
    Address(String),
}

/// SMTP relay settings.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
    pub from_name: String,
    pub use_tls: bool,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field("from_address", &self.from_address)
            .field("from_name", &self.from_name)
            .field("use_tls", &self.use_tls)
            .finish()
    }
}

impl SmtpConfig {
    /// Build from environment lookups. Returns `None` when host or sender is unset.
    pub fn from_lookup(get: &impl Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        let (Some(host), Some(from_address)) = (get("SMTP_HOST"), get("SMTP_FROM_ADDRESS")) else {
            return Ok(None);
        };

        Ok(Some(Self {
            host,
            port: parse_or("SMTP_PORT", get("SMTP_PORT"), 587)?,
            username: get("SMTP_USERNAME"),
            password: get("SMTP_PASSWORD"),
            from_address,
            from_name: get("SMTP_FROM_NAME").unwrap_or_else(|| "Realty Listings".to_string()),
            use_tls: get("SMTP_USE_TLS")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),
        }))
    }
}

/// A message captured by the in-memory transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxMessage {
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub body_text: String,
}

enum Transport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    Outbox(Arc<Mutex<Vec<OutboxMessage>>>),
}

/// Sends multipart (plain text + HTML) emails.
pub struct Mailer {
    transport: Transport,
    from_mailbox: Mailbox,
}

impl Mailer {
    /// Build an SMTP-backed mailer. The connection is opened lazily on send.
    #[tracing::instrument(name = "mailer_new", skip(config), fields(host = %config.host, port = %config.port))]
    pub fn new(config: SmtpConfig) -> Result<Self, MailError> {
        let from_mailbox = parse_mailbox(&format!("{} <{}>", config.from_name, config.from_address))?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| MailError::Connection(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder.port(config.port);
        if let (Some(username), Some(password)) = (config.username, config.password) {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: Transport::Smtp(builder.build()),
            from_mailbox,
        })
    }

    /// A mailer that records messages in memory instead of delivering them.
    pub fn in_memory(from_address: &str) -> Result<(Self, Arc<Mutex<Vec<OutboxMessage>>>), MailError> {
        let outbox = Arc::new(Mutex::new(Vec::new()));
        let mailer = Self {
            transport: Transport::Outbox(Arc::clone(&outbox)),
            from_mailbox: parse_mailbox(from_address)?,
        };
        Ok((mailer, outbox))
    }

    /// Send a message with plain text and HTML alternatives.
    pub async fn send(
        &self,
        to: &str,
        reply_to: Option<&str>,
        subject: &str,
        body_text: &str,
        body_html: &str,
    ) -> Result<(), MailError> {
        let to_mailbox = parse_mailbox(to)?;

        let mut builder = Message::builder()
            .from(self.from_mailbox.clone())
            .to(to_mailbox)
            .subject(subject);
        if let Some(reply_to) = reply_to {
            builder = builder.reply_to(parse_mailbox(reply_to)?);
        }

        let message = builder
            .multipart(MultiPart::alternative_plain_html(
                body_text.to_string(),
                body_html.to_string(),
            ))
            .map_err(|e| MailError::Send(e.to_string()))?;

        match &self.transport {
            Transport::Smtp(transport) => {
                transport
                    .send(message)
                    .await
                    .map_err(|e| MailError::Send(e.to_string()))?;
            }
            Transport::Outbox(outbox) => {
                outbox
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .push(OutboxMessage {
                        to: to.to_string(),
                        reply_to: reply_to.map(str::to_string),
                        subject: subject.to_string(),
                        body_text: body_text.to_string(),
                    });
            }
        }

        tracing::debug!(to = %to, subject = %subject, "email sent");
        Ok(())
    }
}

fn parse_mailbox(raw: &str) -> Result<Mailbox, MailError> {
    raw.parse()
        .map_err(|e: lettre::address::AddressError| MailError::Address(format!("{raw}: {e}")))
}

/// Escape user-supplied text for inclusion in an HTML body.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
