//! HTTP-backed scraping surface
//!
//! Uses a long-lived reqwest::Client for connection pooling. HTTP status
//! codes are mapped onto classified engine errors so the retry policy can
//! tell transient failures from fatal ones. Every redirect hop is held to
//! the same private-host rule as the directive URL.

use crate::error::ActionError;
use crate::models::ScrapedPage;
use crate::safety::is_private_host;
use crate::surfaces::Scraper;
use crate::Result;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{redirect, Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

const EXCERPT_CHARS: usize = 280;
const MAX_REDIRECTS: usize = 5;

lazy_static! {
    static ref TITLE_PATTERN: Regex = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap();
    static ref SCRIPT_PATTERN: Regex =
        Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>").unwrap();
    static ref TAG_PATTERN: Regex = Regex::new(r"(?s)<[^>]+>").unwrap();
    static ref WHITESPACE_PATTERN: Regex = Regex::new(r"\s+").unwrap();
}

/// Scraper fetching pages over HTTP(S)
#[derive(Clone)]
pub struct HttpScraper {
    client: Client,
}

impl HttpScraper {
    /// `allow_private_hosts` mirrors the safety policy flag and governs
    /// where redirects may lead.
    pub fn new(timeout: Duration, allow_private_hosts: bool) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect_policy(allow_private_hosts))
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .user_agent(concat!("agentic-action-engine/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

fn redirect_policy(allow_private_hosts: bool) -> redirect::Policy {
    redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }

        let blocked = match attempt.url().host() {
            Some(host) => !allow_private_hosts && is_private_host(&host),
            None => true,
        };

        if blocked {
            let message = format!("redirect to blocked host: {}", attempt.url());
            warn!(target_url = %attempt.url(), "Redirect rejected");
            attempt.error(message)
        } else {
            attempt.follow()
        }
    })
}

#[async_trait::async_trait]
impl Scraper for HttpScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage> {
        debug!(url = %url, "Fetching page");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_redirect() {
                ActionError::Forbidden(format!("fetching {}: {}", url, e))
            } else if e.is_timeout() {
                ActionError::Timeout(format!("fetching {}", url))
            } else {
                ActionError::Network(format!("fetching {}: {}", url, e))
            }
        })?;

        let final_url = response.url().to_string();
        if final_url != url {
            debug!(url = %url, final_url = %final_url, "Followed redirect");
        }

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, %status, "Scrape returned error status");
            return Err(status_error(status, url));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ActionError::Timeout(format!("reading {}", url))
            } else {
                ActionError::Network(format!("reading {}: {}", url, e))
            }
        })?;

        Ok(extract_page(&final_url, &body))
    }
}

fn status_error(status: StatusCode, url: &str) -> ActionError {
    let detail = format!("{} returned {}", url, status);
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => ActionError::NotFound(detail),
        StatusCode::UNAUTHORIZED => ActionError::PermissionDenied(detail),
        StatusCode::FORBIDDEN => ActionError::Forbidden(detail),
        StatusCode::TOO_MANY_REQUESTS => ActionError::RateLimited(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ActionError::Timeout(detail),
        s if s.is_server_error() => ActionError::Network(detail),
        _ => ActionError::Surface(detail),
    }
}

/// Title, plain-text content and a short excerpt from an HTML document.
pub fn extract_page(url: &str, html: &str) -> ScrapedPage {
    let title = TITLE_PATTERN
        .captures(html)
        .map(|caps| collapse_whitespace(&caps[1]))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| url.to_string());

    let without_scripts = SCRIPT_PATTERN.replace_all(html, " ");
    let text = TAG_PATTERN.replace_all(&without_scripts, " ");
    let content = collapse_whitespace(&text);
    let excerpt: String = content.chars().take(EXCERPT_CHARS).collect();

    ScrapedPage {
        url: url.to_string(),
        title,
        excerpt,
        content,
    }
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_PATTERN.replace_all(text, " ").trim().to_string()
}
