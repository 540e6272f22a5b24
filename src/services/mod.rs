//! Service layer for the notifier.
//!
//! This module contains the collaborators the sync pipeline talks to:
//! - Link extraction (`LinkExtractor`, `HtmlLinkExtractor`)
//! - Notification delivery (`MailTransport`, `SmtpMailer`, `TelegramNotifier`)

mod extractor;
mod mailer;

pub use extractor::{HtmlLinkExtractor, LinkExtractor, parse_links};
pub use mailer::{MailTransport, SmtpMailer, TelegramNotifier, transport_from_config};
