//! Outgoing mail.
//!
//! Messages are handed to a [`Mailer`] chosen from configuration. The
//! process never speaks SMTP itself: production deployments either read
//! the log or point the webhook transport at a mail relay.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use vf_core::config::{MailConfig, MailTransport};
use vf_core::{Error, Result};

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMail {
    pub subject: String,
    pub from: String,
    pub to: Vec<String>,
    pub html: String,
    /// Tag-stripped rendition of `html`.
    pub text: String,
}

impl OutgoingMail {
    pub fn new(subject: impl Into<String>, from: impl Into<String>, to: impl Into<String>, html: String) -> Self {
        let text = strip_tags(&html);
        Self {
            subject: subject.into(),
            from: from.into(),
            to: vec![to.into()],
            html,
            text,
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Writes every message to the log.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        tracing::info!(
            to = ?mail.to,
            subject = %mail.subject,
            "Outgoing mail\n{}",
            mail.text
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// POSTs each message as JSON to a relay endpoint.
#[derive(Debug, Clone)]
pub struct WebhookMailer {
    client: reqwest::Client,
    url: String,
}

impl WebhookMailer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(mail)
            .send()
            .await
            .map_err(|e| Error::Mail(format!("webhook request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::Mail(format!(
                "webhook answered {} for '{}'",
                resp.status(),
                mail.subject
            )));
        }
        tracing::debug!(to = ?mail.to, "Mail handed to webhook");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// Keeps sent messages in memory.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl MemoryMailer {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        self.sent.lock().push(mail.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Build the mailer selected by `config.transport`.
pub fn from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    match config.transport {
        MailTransport::Log => Ok(Arc::new(LogMailer)),
        MailTransport::Webhook => {
            let url = config
                .webhook_url
                .as_deref()
                .ok_or_else(|| Error::Mail("mail.webhook_url is required for the webhook transport".into()))?;
            Ok(Arc::new(WebhookMailer::new(url)))
        }
    }
}

/// Drop HTML tags, decode the handful of entities templates use, and
/// collapse blank-line runs.
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }

    let decoded = out
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    let mut lines = Vec::new();
    let mut blank = false;
    for line in decoded.lines().map(str::trim) {
        if line.is_empty() {
            if !blank && !lines.is_empty() {
                lines.push("");
            }
            blank = true;
        } else {
            lines.push(line);
            blank = false;
        }
    }
    lines.join("\n").trim_end().to_string()
}
