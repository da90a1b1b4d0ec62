//! Subscription feed retrieval
//!
//! Loads subscription URLs from a file, fetches each feed, and decodes the
//! body (feeds are commonly base64-wrapped). One unreachable feed costs its
//! own candidates only, never the run.

use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::error::{Result, TopVpnError};
use crate::models::Subscription;
use crate::parser;

const FETCH_CONCURRENCY: usize = 8;

pub struct SubscriptionManager {
    urls: Vec<String>,
    pub subscriptions: Vec<Subscription>,
    timeout: Duration,
}

impl SubscriptionManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            urls: Vec::new(),
            subscriptions: Vec::new(),
            timeout,
        }
    }

    /// Load subscription URLs from a file, one per line; only `https://`
    /// lines count, anything else in the file is ignored.
    pub fn add_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TopVpnError::SubscriptionFile(format!("{}: {}", path.display(), e))
        })?;

        let urls: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with("https://"))
            .map(str::to_string)
            .collect();

        info!("Loaded {} subscriptions from {}", urls.len(), path.display());
        for url in urls {
            if !self.urls.contains(&url) {
                self.urls.push(url);
            }
        }
        Ok(())
    }

    pub fn add_url(&mut self, url: impl Into<String>) {
        let url = url.into();
        if !self.urls.contains(&url) {
            self.urls.push(url);
        }
    }

    /// Fetch every feed concurrently. A failed fetch yields an empty
    /// subscription and a warning; the remaining feeds still count.
    pub async fn fetch_all(&mut self) -> Result<()> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()?;
        let schemes = parser::supported_schemes();

        let subscriptions: Vec<Subscription> = futures::stream::iter(self.urls.clone())
            .map(|url| {
                let client = client.clone();
                let schemes = schemes.clone();
                async move { fetch_subscription(&client, &url, &schemes).await }
            })
            .buffered(FETCH_CONCURRENCY)
            .collect()
            .await;

        for sub in &subscriptions {
            debug!("Fetched {} server URLs from {}", sub.server_urls.len(), sub.url);
        }
        self.subscriptions = subscriptions;
        Ok(())
    }
}

async fn fetch_subscription(
    client: &reqwest::Client,
    url: &str,
    schemes: &[&str],
) -> Subscription {
    info!("Fetching subscription from {}", url);
    let text = match request_feed(client, url).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to fetch subscription from {}: {}", url, e);
            return Subscription::new(url);
        }
    };
    Subscription::from_content(url, &decode_feed(&text), schemes)
}

async fn request_feed(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?;
    let response = response
        .error_for_status()
        .map_err(|e| TopVpnError::Http(e.to_string()))?;
    Ok(response.text().await?)
}

/// Feeds are frequently base64-encoded; decode when that yields valid UTF-8,
/// otherwise treat the body as plain text.
fn decode_feed(text: &str) -> String {
    let compact: String = text.split_whitespace().collect();
    match BASE64.decode(&compact) {
        Ok(bytes) => String::from_utf8(bytes).unwrap_or_else(|_| text.to_string()),
        Err(_) => text.to_string(),
    }
}
