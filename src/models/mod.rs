// src/models/mod.rs

//! Domain models for the notifier.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod blog;
mod config;
mod crawl;

// Re-export all public types
pub use blog::{KnownPost, PendingNotification, WatchedSite};
pub use config::{
    Config, CrawlerConfig, DeliveryMode, EmailClient, EmailServer, NotifierConfig, TelegramConfig,
};
pub use crawl::{CrawlOutcome, DeliveryFailure, SiteFailure};
