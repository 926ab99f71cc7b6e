//! Outbound mail for password-reset codes.
//!
//! `HttpMailer` posts a JSON message to a transactional mail API configured
//! through `MAIL_API_URL` / `MAIL_API_KEY` / `MAIL_FROM`. Without those
//! variables `LogMailer` is used and the message is only written to the log.
use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::MailConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    pub fn reset_code(to: &str, code: &str, ttl_minutes: i64) -> Self {
        Self {
            to: to.to_string(),
            subject: "Your password reset code".into(),
            body: format!(
                "Use the code {code} to reset your password. \
                 It expires in {ttl_minutes} minutes and can be used once.\n\n\
                 If you did not ask for a reset you can ignore this message."
            ),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()>;
}

#[derive(Clone, Debug)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        info!(to = %message.to, subject = %message.subject, "mail delivery disabled; message logged");
        debug!(body = %message.body, "mail body");
        Ok(())
    }
}

#[derive(Serialize)]
struct OutboundMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    config: MailConfig,
}

impl HttpMailer {
    pub fn new(config: MailConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("build mail http client")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        let payload = OutboundMail {
            from: &self.config.from,
            to: &message.to,
            subject: &message.subject,
            text: &message.body,
        };
        self.client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .context("mail api request")?
            .error_for_status()
            .context("mail api response")?;
        info!(to = %message.to, "mail sent");
        Ok(())
    }
}
