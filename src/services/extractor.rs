// src/services/extractor.rs

//! Link extraction service.
//!
//! Fetches one page and returns the hyperlink targets found in it.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;
use crate::utils::http::create_async_client;

/// Source of outgoing links for a URL.
#[async_trait]
pub trait LinkExtractor: Send + Sync {
    /// Fetch `url` and return the links it contains, in document order.
    ///
    /// Fails if the page is unreachable, answers with a non-2xx status or
    /// cannot be parsed.
    async fn extract_links(&self, url: &str) -> Result<Vec<String>>;
}

/// Extracts `<a href>` targets from HTML pages over HTTP.
pub struct HtmlLinkExtractor {
    client: Client,
}

impl HtmlLinkExtractor {
    /// Create an extractor with a client built from the crawler settings.
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LinkExtractor for HtmlLinkExtractor {
    async fn extract_links(&self, url: &str) -> Result<Vec<String>> {
        let base = Url::parse(url)?;
        let response = self
            .client
            .get(base.clone())
            .send()
            .await?
            .error_for_status()?;

        let html = response.text().await?;
        let links = parse_links(&base, &html)?;
        log::debug!("{} links on {}", links.len(), url);
        Ok(links)
    }
}

/// Collect absolute http(s) link targets from an HTML document.
///
/// Relative hrefs are resolved against `base`, fragments are stripped, and
/// fragment-only, `mailto:` and `javascript:` targets are skipped.
pub fn parse_links(base: &Url, html: &str) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a[href]")
        .map_err(|e| AppError::crawl(base.as_str(), format!("invalid selector: {e:?}")))?;

    let links = document
        .select(&anchors)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty() && !href.starts_with('#'))
        .filter_map(|href| base.join(href).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(|mut url| {
            url.set_fragment(None);
            url.to_string()
        })
        .collect();

    Ok(links)
}
