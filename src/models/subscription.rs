use std::collections::BTreeSet;

/// One subscription feed: its URL and the raw candidate URLs it yielded.
///
/// Set semantics because duplicate lines in a feed are common; the sorted set
/// also gives a deterministic parse order downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub url: String,
    pub server_urls: BTreeSet<String>,
}

impl Subscription {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            server_urls: BTreeSet::new(),
        }
    }

    /// Build a subscription from decoded feed text, keeping lines that start
    /// with a recognised candidate scheme.
    pub fn from_content(url: impl Into<String>, content: &str, schemes: &[&str]) -> Self {
        let server_urls = content
            .lines()
            .map(str::trim)
            .filter(|line| {
                schemes
                    .iter()
                    .any(|scheme| line.starts_with(&format!("{}://", scheme)))
            })
            .map(str::to_string)
            .collect();
        Self {
            url: url.into(),
            server_urls,
        }
    }
}
