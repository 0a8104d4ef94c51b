use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;

use crate::config::MailConfig;

#[derive(Debug, Clone, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> anyhow::Result<()>;
}

/// Posts mails to an HTTP relay as JSON.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(url: impl Into<String>, api_key: Option<String>, from: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key,
            from: from.into(),
        }
    }
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: Email) -> anyhow::Result<()> {
        let mut req = self.client.post(&self.url).json(&RelayMessage {
            from: &self.from,
            to: &email.to,
            subject: &email.subject,
            text: &email.text,
        });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req.send()
            .await
            .context("mail relay request")?
            .error_for_status()
            .context("mail relay rejected message")?;
        tracing::info!(to = %email.to, subject = %email.subject, "mail sent");
        Ok(())
    }
}

/// Development mailer: logs instead of delivering.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> anyhow::Result<()> {
        tracing::info!(to = %email.to, subject = %email.subject, body = %email.text, "mail (not delivered)");
        Ok(())
    }
}

pub fn from_config(cfg: &MailConfig) -> std::sync::Arc<dyn Mailer> {
    match &cfg.api_url {
        Some(url) => std::sync::Arc::new(HttpMailer::new(url, cfg.api_key.clone(), &cfg.from)),
        None => {
            tracing::warn!("MAIL_API_URL not set; mails will only be logged");
            std::sync::Arc::new(LogMailer)
        }
    }
}
