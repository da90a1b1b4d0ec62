//! Candidate set building and measurement merging
//!
//! The manager owns the deduplicated candidate set in insertion order.
//! Probers never touch the set directly; they return result maps keyed by
//! candidate identity and the manager applies them here.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::models::{Server, ServerKey, Subscription, NOT_ALIVE};
use crate::parser;
use crate::ranking;

#[derive(Default)]
pub struct ServerManager {
    servers: Vec<Server>,
    keys: HashSet<ServerKey>,
    only_443_port: bool,
}

impl ServerManager {
    pub fn new(only_443_port: bool) -> Self {
        Self {
            only_443_port,
            ..Self::default()
        }
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Parse and insert every candidate URL from a subscription. Malformed
    /// lines and unsupported schemes are logged and skipped; the batch never
    /// fails because of one bad line.
    pub fn add_from_subscription(&mut self, subscription: &Subscription) {
        debug!(
            "Adding servers from subscription: {} (only_443_port={})",
            subscription.url, self.only_443_port
        );
        let initial_count = self.servers.len();
        let mut skipped = 0usize;

        for raw_url in &subscription.server_urls {
            match parser::parse_server_url(raw_url, &subscription.url) {
                Ok(server) => {
                    self.insert(server);
                }
                Err(e) => {
                    warn!("Skipping invalid link: {}. Reason: {}", raw_url, e);
                    skipped += 1;
                }
            }
        }

        info!(
            "Added {} new servers from subscription {} ({} skipped). Total servers: {}",
            self.servers.len() - initial_count,
            subscription.url,
            skipped,
            self.servers.len()
        );
    }

    pub fn add_from_subscriptions<'a, I>(&mut self, subscriptions: I)
    where
        I: IntoIterator<Item = &'a Subscription>,
    {
        for subscription in subscriptions {
            self.add_from_subscription(subscription);
        }
    }

    /// Insert a parsed candidate, applying the port policy and dropping
    /// duplicates by (address, port, identity). Returns whether it was kept.
    pub fn insert(&mut self, server: Server) -> bool {
        if self.only_443_port && server.port != 443 {
            return false;
        }
        if !self.keys.insert(server.key()) {
            return false;
        }
        self.servers.push(server);
        true
    }

    /// Merge connection-probe results into the owned candidates.
    pub fn apply_connection_results(&mut self, results: &HashMap<ServerKey, f64>) {
        for server in &mut self.servers {
            if let Some(&elapsed) = results.get(&server.key()) {
                server.measurement.connection_time = elapsed;
            }
        }
    }

    /// Initialise every candidate's per-URL time to the failure sentinel.
    /// Candidates that end up with no slot assignment keep these values, so
    /// they rank as unreachable rather than vacuously alive.
    pub fn seed_http_sentinels(&mut self, urls: &[String]) {
        for server in &mut self.servers {
            for url in urls {
                server
                    .measurement
                    .http_times
                    .insert(url.clone(), NOT_ALIVE);
            }
        }
    }

    /// Merge HTTP-probe results into the owned candidates.
    pub fn apply_http_results(&mut self, results: &HashMap<ServerKey, HashMap<String, f64>>) {
        for server in &mut self.servers {
            if let Some(times) = results.get(&server.key()) {
                server.measurement.http_times.extend(times.clone());
            }
        }
    }

    /// Drop candidates whose TCP connect failed.
    pub fn filter_alive_connection(&mut self) {
        let before = self.servers.len();
        self.retain(|s| s.measurement.connection_time < NOT_ALIVE);
        info!(
            "Filtered {} dead servers out of {} by connection time",
            before - self.servers.len(),
            before
        );
    }

    /// Drop candidates where any probed URL failed.
    pub fn filter_alive_http(&mut self) {
        let before = self.servers.len();
        self.retain(|s| s.measurement.http_time_total() < NOT_ALIVE);
        info!(
            "Filtered {} dead servers out of {} by HTTP time",
            before - self.servers.len(),
            before
        );
    }

    fn retain<F: Fn(&Server) -> bool>(&mut self, keep: F) {
        self.servers.retain(&keep);
        let keys: HashSet<ServerKey> = self.servers.iter().map(Server::key).collect();
        self.keys = keys;
    }

    pub fn fastest_by_connection(&self, n: usize) -> Vec<&Server> {
        ranking::fastest_by_connection(&self.servers, n)
    }

    pub fn fastest_by_http(&self, n: usize) -> Vec<&Server> {
        ranking::fastest_by_http(&self.servers, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BAD_STATUS;

    fn subscription(urls: &[&str]) -> Subscription {
        let mut sub = Subscription::new("https://feed.example");
        for url in urls {
            sub.server_urls.insert(url.to_string());
        }
        sub
    }

    #[test]
    fn test_malformed_line_skipped_not_fatal() {
        // Scenario: three raw URLs, one without a port.
        let sub = subscription(&[
            "vless://uuid-1@1.2.3.4:443#a",
            "vless://uuid-2@5.6.7.8#no-port",
            "vless://uuid-3@9.9.9.9:8443#c",
        ]);
        let mut manager = ServerManager::new(false);
        manager.add_from_subscription(&sub);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_dedup_by_endpoint_and_identity() {
        let sub = subscription(&[
            "vless://uuid-1@1.2.3.4:443?security=none#a",
            "vless://uuid-1@1.2.3.4:443?security=reality&sni=x.example#b",
            "vless://uuid-2@1.2.3.4:443#c",
        ]);
        let mut manager = ServerManager::new(false);
        manager.add_from_subscription(&sub);
        // Same (address, port, identity) with different params is one entry.
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_port_policy_filter() {
        let sub = subscription(&[
            "vless://uuid-1@1.2.3.4:443#a",
            "vless://uuid-2@5.6.7.8:8443#b",
        ]);
        let mut manager = ServerManager::new(true);
        manager.add_from_subscription(&sub);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.servers()[0].port, 443);
    }

    #[test]
    fn test_apply_connection_results_and_filter() {
        let sub = subscription(&[
            "vless://uuid-1@1.2.3.4:443#a",
            "vless://uuid-2@5.6.7.8:443#b",
        ]);
        let mut manager = ServerManager::new(false);
        manager.add_from_subscription(&sub);

        let mut results = HashMap::new();
        results.insert(manager.servers()[0].key(), 0.042);
        results.insert(manager.servers()[1].key(), NOT_ALIVE);
        manager.apply_connection_results(&results);
        manager.filter_alive_connection();

        assert_eq!(manager.len(), 1);
        assert_eq!(manager.servers()[0].measurement.connection_time, 0.042);
    }

    #[test]
    fn test_connection_alive_but_http_poisoned() {
        // Scenario: working TCP connect but one of two target URLs failing.
        let urls = vec![
            "https://a.example".to_string(),
            "https://b.example".to_string(),
        ];
        let sub = subscription(&["vless://uuid-1@1.2.3.4:443#a"]);
        let mut manager = ServerManager::new(false);
        manager.add_from_subscription(&sub);

        let key = manager.servers()[0].key();
        let mut conn = HashMap::new();
        conn.insert(key.clone(), 0.05);
        manager.apply_connection_results(&conn);

        manager.seed_http_sentinels(&urls);
        let mut http = HashMap::new();
        let mut times = HashMap::new();
        times.insert(urls[0].clone(), 0.3);
        times.insert(urls[1].clone(), BAD_STATUS);
        http.insert(key, times);
        manager.apply_http_results(&http);

        assert_eq!(ranking::alive_by_connection(manager.servers()).len(), 1);
        assert_eq!(ranking::alive_by_http(manager.servers()).len(), 0);
    }

    #[test]
    fn test_unassigned_candidate_keeps_sentinels() {
        let urls = vec!["https://a.example".to_string()];
        let sub = subscription(&["vless://uuid-1@1.2.3.4:443#a"]);
        let mut manager = ServerManager::new(false);
        manager.add_from_subscription(&sub);

        manager.seed_http_sentinels(&urls);
        // No results applied: the candidate was never assigned a slot.
        assert_eq!(ranking::alive_by_http(manager.servers()).len(), 0);
    }

    #[test]
    fn test_insert_after_filter_allows_reinsertion_of_removed_only() {
        let sub = subscription(&["vless://uuid-1@1.2.3.4:443#a"]);
        let mut manager = ServerManager::new(false);
        manager.add_from_subscription(&sub);

        // Re-inserting an existing candidate is a no-op.
        let duplicate = manager.servers()[0].clone();
        assert!(!manager.insert(duplicate));
        assert_eq!(manager.len(), 1);
    }
}
