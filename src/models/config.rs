//! Application configuration structures.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Which transport delivers notifications
    #[serde(default)]
    pub mode: DeliveryMode,

    /// SMTP server address
    #[serde(default)]
    pub server: EmailServer,

    /// Mail account and recipient
    #[serde(default)]
    pub client: EmailClient,

    /// Telegram bot settings
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Notification dispatch settings
    #[serde(default)]
    pub notifier: NotifierConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load and validate in one step.
    pub fn load_validated(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        self.crawler.validate()?;
        if self.notifier.max_concurrent == 0 {
            return Err(AppError::validation("notifier.max_concurrent must be > 0"));
        }
        if self.notifier.timeout_secs == 0 {
            return Err(AppError::validation("notifier.timeout_secs must be > 0"));
        }

        match self.mode {
            DeliveryMode::Email => {
                if self.server.host.trim().is_empty() {
                    return Err(AppError::validation("server.host is empty"));
                }
                if self.server.port == 0 {
                    return Err(AppError::validation("server.port must be > 0"));
                }
                if !looks_like_address(&self.client.email) {
                    return Err(AppError::validation(format!(
                        "client.email '{}' is not a mail address",
                        self.client.email
                    )));
                }
                if !looks_like_address(&self.client.send_to) {
                    return Err(AppError::validation(format!(
                        "client.send_to '{}' is not a mail address",
                        self.client.send_to
                    )));
                }
            }
            DeliveryMode::Telegram => {
                if self.telegram.bot_token.trim().is_empty() {
                    return Err(AppError::validation("telegram.bot_token is empty"));
                }
                if self.telegram.channel.trim().is_empty() {
                    return Err(AppError::validation("telegram.channel is empty"));
                }
            }
        }
        Ok(())
    }

    /// `host:port` of the SMTP server.
    pub fn mail_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "mode: {}", self.mode)?;
        writeln!(f, "email_server: {}", self.mail_address())?;
        writeln!(
            f,
            "client: {} {} {}",
            self.client.email,
            mask(&self.client.password),
            self.client.send_to
        )?;
        writeln!(
            f,
            "telegram: {}@{}",
            mask(&self.telegram.bot_token),
            self.telegram.channel
        )?;
        write!(
            f,
            "crawler: depth={} concurrency={} same_host_only={}",
            self.crawler.max_depth, self.crawler.max_concurrent, self.crawler.same_host_only
        )
    }
}

fn looks_like_address(s: &str) -> bool {
    match s.trim().split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() { "<unset>" } else { "********" }
}

/// Notification transport selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    #[default]
    Email,
    Telegram,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Email => f.write_str("email"),
            DeliveryMode::Telegram => f.write_str("telegram"),
        }
    }
}

/// SMTP server address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailServer {
    #[serde(default = "defaults::host")]
    pub host: String,

    #[serde(default = "defaults::port")]
    pub port: u16,
}

impl Default for EmailServer {
    fn default() -> Self {
        Self {
            host: defaults::host(),
            port: defaults::port(),
        }
    }
}

/// Sender account and recipient.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailClient {
    /// Sender address, also the SMTP login
    #[serde(default)]
    pub email: String,

    /// SMTP password; empty disables authentication
    #[serde(default)]
    pub password: String,

    /// Recipient address
    #[serde(default)]
    pub send_to: String,
}

/// Telegram bot delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Chat id or `@channel` name
    #[serde(default)]
    pub channel: String,

    #[serde(default)]
    pub bot_token: String,

    /// Bot API base URL
    #[serde(default = "defaults::telegram_api")]
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            channel: String::new(),
            bot_token: String::new(),
            api_base: defaults::telegram_api(),
        }
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Hops followed from the seed page; links on the deepest fetched pages
    /// are recorded but not fetched
    #[serde(default = "defaults::max_depth")]
    pub max_depth: usize,

    /// Maximum concurrent site crawls, and page fetches within one site
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Upper bound for a whole site traversal
    #[serde(default = "defaults::task_timeout")]
    pub task_timeout_secs: u64,

    /// Only follow links on the seed's host
    #[serde(default)]
    pub same_host_only: bool,
}

impl CrawlerConfig {
    /// Load the `[crawler]` section of a config file and validate it. The
    /// delivery sections are not checked.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let crawler = Config::load(path)?.crawler;
        crawler.validate()?;
        Ok(crawler)
    }

    pub fn validate(&self) -> Result<()> {
        if self.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.task_timeout_secs == 0 {
            return Err(AppError::validation(
                "crawler.task_timeout_secs must be > 0",
            ));
        }
        if self.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        Ok(())
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_depth: defaults::max_depth(),
            max_concurrent: defaults::max_concurrent(),
            task_timeout_secs: defaults::task_timeout(),
            same_host_only: false,
        }
    }
}

/// Notification dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Maximum concurrent deliveries
    #[serde(default = "defaults::notifier_concurrent")]
    pub max_concurrent: usize,

    /// Upper bound for one delivery
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::notifier_concurrent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

mod defaults {
    pub fn host() -> String {
        "localhost".into()
    }
    pub fn port() -> u16 {
        25
    }
    pub fn telegram_api() -> String {
        "https://api.telegram.org".into()
    }

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; blog-notifier/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_depth() -> usize {
        3
    }
    pub fn max_concurrent() -> usize {
        8
    }
    pub fn task_timeout() -> u64 {
        120
    }

    pub fn notifier_concurrent() -> usize {
        4
    }
}
