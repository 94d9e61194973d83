use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use diesel::PgConnection;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::config::EmailConfig;
use crate::jobs::{enqueue, JobPayload, JOB_SEND_EMAIL};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
}

impl JobPayload for OutboundEmail {
    const JOB_TYPE: &'static str = JOB_SEND_EMAIL;
}

#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, email: &OutboundEmail) -> Result<()>;
}

/// Sends through a Resend-compatible JSON endpoint.
pub struct HttpMailer {
    client: Client,
    api_url: String,
    api_key: String,
    from_address: String,
}

impl HttpMailer {
    pub fn new(client: Client, config: &EmailConfig, api_key: String) -> Self {
        Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            from_address: config.from_address.clone(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from_address,
                "to": email.to,
                "subject": email.subject,
                "text": email.text,
            }))
            .send()
            .await
            .context("email request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("email API returned {status}: {body}");
        }
        Ok(())
    }
}

/// Used when no email API key is configured; emails are only logged.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        info!(to = ?email.to, subject = %email.subject, "email delivery disabled; dropping email");
        Ok(())
    }
}

pub fn build_mailer(client: Client, config: &EmailConfig) -> std::sync::Arc<dyn Mailer> {
    match &config.api_key {
        Some(key) => std::sync::Arc::new(HttpMailer::new(client, config, key.clone())),
        None => std::sync::Arc::new(LogMailer),
    }
}

/// Queues an email for the worker. Failures are logged and swallowed so a
/// notification problem never fails the request that triggered it.
pub fn queue_email(conn: &mut PgConnection, email: OutboundEmail) -> bool {
    if email.to.is_empty() {
        return false;
    }
    match enqueue(conn, &email, None) {
        Ok(_) => true,
        Err(err) => {
            warn!(subject = %email.subject, error = %err, "failed to queue email");
            false
        }
    }
}
