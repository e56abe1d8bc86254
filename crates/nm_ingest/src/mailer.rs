use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nm_core::config::EmailConfig;
use nm_core::{Error, Mailer, Result};
use reqwest::Client;
use serde::Serialize;

#[derive(Serialize)]
struct Contact<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    sender: Contact<'a>,
    to: Vec<Contact<'a>>,
    subject: &'a str,
    html_content: &'a str,
}

/// Transactional email through Brevo's HTTP API.
pub struct BrevoMailer {
    client: Client,
    api_key: String,
    sender_email: String,
    sender_name: String,
    base_url: String,
}

impl BrevoMailer {
    const BASE_URL: &'static str = "https://api.brevo.com";

    pub fn new(api_key: String, sender_email: String, sender_name: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
            sender_email,
            sender_name,
            base_url: Self::BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request<'a>(&'a self, to: &'a str, subject: &'a str, html: &'a str) -> SendRequest<'a> {
        SendRequest {
            sender: Contact {
                email: &self.sender_email,
                name: Some(&self.sender_name),
            },
            to: vec![Contact { email: to, name: None }],
            subject,
            html_content: html,
        }
    }
}

impl fmt::Debug for BrevoMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrevoMailer")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("sender_email", &self.sender_email)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl Mailer for BrevoMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/v3/smtp/email", self.base_url))
            .header("api-key", &self.api_key)
            .json(&self.request(to, subject, html))
            .send()
            .await
            .map_err(|e| Error::Email(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Email(format!("Brevo returned {}: {}", status, body)));
        }
        tracing::info!("Email sent to {}", to);
        Ok(())
    }
}

/// Writes emails to the log instead of sending them.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        tracing::info!("Email to {} ({} bytes): {}", to, html.len(), subject);
        Ok(())
    }
}

pub fn create_mailer(config: &EmailConfig, timeout: Duration) -> Result<Arc<dyn Mailer>> {
    match &config.brevo_api_key {
        Some(key) => Ok(Arc::new(BrevoMailer::new(
            key.clone(),
            config.sender_email.clone(),
            config.sender_name.clone(),
            timeout,
        )?)),
        None => {
            tracing::warn!("Brevo API key not configured, digests will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let mailer = BrevoMailer::new(
            "secret".to_string(),
            "noreply@example.com".to_string(),
            "News".to_string(),
            Duration::from_secs(1),
        )
        .unwrap();
        let body = serde_json::to_value(mailer.request("reader@example.com", "Hello", "<p>Hi</p>")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "sender": {"email": "noreply@example.com", "name": "News"},
                "to": [{"email": "reader@example.com"}],
                "subject": "Hello",
                "htmlContent": "<p>Hi</p>"
            })
        );
        assert!(!format!("{:?}", mailer).contains("secret"));
    }

    #[tokio::test]
    async fn test_unreachable_brevo_is_an_email_error() {
        let mailer = BrevoMailer::new(
            "secret".to_string(),
            "noreply@example.com".to_string(),
            "News".to_string(),
            Duration::from_secs(1),
        )
        .unwrap()
        .with_base_url("http://127.0.0.1:9");
        assert!(matches!(mailer.send("a@example.com", "s", "b").await, Err(Error::Email(_))));
    }

    #[tokio::test]
    async fn test_log_mailer_without_key() {
        let config = nm_core::AppConfig::from_lookup(|_| None).unwrap();
        let mailer = create_mailer(&config.email, Duration::from_secs(1)).unwrap();
        mailer.send("a@example.com", "subject", "<p>body</p>").await.unwrap();
    }
}
