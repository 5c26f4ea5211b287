// Outgoing email: lead notifications, wishes and password resets

use crate::config::MailConfig;
use crate::errors::MailError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

const REQUEST_TIMEOUT_SECONDS: u64 = 15;

/// A rendered HTML message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

/// Posts messages as JSON to a transactional mail API with a bearer key
pub struct HttpMailer {
    client: Client,
    api_url: String,
    api_key: String,
    from_address: String,
    from_name: String,
}

impl HttpMailer {
    pub fn new(api_url: &str, config: &MailConfig) -> Result<Self, MailError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()
            .map_err(|e| MailError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.to_string(),
            api_key: config.api_key.clone(),
            from_address: config.from_address.clone(),
            from_name: config.from_name.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    #[instrument(skip(self, email), fields(to = %email.to))]
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let body = json!({
            "from": { "email": self.from_address, "name": self.from_name },
            "to": [{ "email": email.to }],
            "subject": email.subject,
            "html": email.html,
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected { status, body });
        }

        info!("Email sent");
        Ok(())
    }
}

/// Development mailer: records the message in the log and reports success
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        info!(to = %email.to, subject = %email.subject, "Mail API not configured, email logged only");
        Ok(())
    }
}

pub fn build_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match config.api_url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => Ok(Arc::new(HttpMailer::new(url, config)?)),
        None => Ok(Arc::new(LogMailer)),
    }
}

/// Minimal HTML escaping for values placed into message bodies
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

pub fn password_reset_email(to: &str, first_name: &str, reset_url: &str, ttl_minutes: i64) -> Email {
    let name = if first_name.trim().is_empty() { "User" } else { first_name };
    Email {
        to: to.to_string(),
        subject: "Password Reset Request - Mini CRM 360".to_string(),
        html: format!(
            "<h2>Password Reset Request</h2>\
             <p>Hello {},</p>\
             <p>We received a request to reset your Mini CRM 360 password.</p>\
             <p><a href=\"{url}\">Reset Password</a></p>\
             <p>Or open this link: {url}</p>\
             <p>This link expires in {} minutes. If you did not ask for a reset, ignore this email.</p>",
            escape_html(name),
            ttl_minutes,
            url = escape_html(reset_url),
        ),
    }
}
