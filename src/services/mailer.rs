// src/services/mailer.rs

//! Notification transports.
//!
//! Server address, credentials, sender and recipient are bound when a
//! transport is built, so delivery only needs the message text.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Config, DeliveryMode, TelegramConfig};

const SUBJECT: &str = "New blog post";

/// Delivers a single notification message.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &str) -> Result<()>;
}

/// Build the transport selected by `config.mode`.
pub fn transport_from_config(config: &Config) -> Result<Arc<dyn MailTransport>> {
    let transport: Arc<dyn MailTransport> = match config.mode {
        DeliveryMode::Email => Arc::new(SmtpMailer::new(config)?),
        DeliveryMode::Telegram => Arc::new(TelegramNotifier::new(
            &config.telegram,
            Duration::from_secs(config.notifier.timeout_secs),
        )?),
    };
    Ok(transport)
}

/// Sends notifications as plain-text mail over SMTP.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &Config) -> Result<Self> {
        let from = parse_mailbox("client.email", &config.client.email)?;
        let to = parse_mailbox("client.send_to", &config.client.send_to)?;

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.server.host.as_str())
                .port(config.server.port)
                .timeout(Some(Duration::from_secs(config.notifier.timeout_secs)));

        if !config.client.password.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.client.email.clone(),
                config.client.password.clone(),
            ));
        }

        log::debug!("SMTP transport for {}", config.mail_address());

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, message: &str) -> Result<()> {
        let mail = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(SUBJECT)
            .body(message.to_string())
            .map_err(|e| AppError::delivery(self.to.to_string(), e))?;

        self.transport
            .send(mail)
            .await
            .map_err(|e| AppError::delivery(self.to.to_string(), e))?;
        Ok(())
    }
}

fn parse_mailbox(field: &str, value: &str) -> Result<Mailbox> {
    value
        .trim()
        .parse()
        .map_err(|e| AppError::config(format!("{field} '{value}' is not a mail address: {e}")))
}

/// Posts notifications to a Telegram chat through the Bot API.
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_base.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.channel.clone(),
        })
    }
}

#[async_trait]
impl MailTransport for TelegramNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text: message,
            })
            .send()
            .await?;

        let status = response.status();
        // Error replies are not always JSON; a missing body counts as a rejection.
        let body = response.json::<ApiResponse>().await.ok();
        match body {
            Some(ApiResponse { ok: true, .. }) if status.is_success() => Ok(()),
            body => Err(AppError::delivery(
                &self.chat_id,
                body.and_then(|b| b.description)
                    .unwrap_or_else(|| format!("telegram answered {status}")),
            )),
        }
    }
}
