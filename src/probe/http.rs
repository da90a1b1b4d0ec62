//! HTTP probing through assigned proxy slots
//!
//! Each slot-assigned candidate gets one client proxied through its local
//! SOCKS port and one GET per target URL. A chunk-global admission gate
//! bounds in-flight requests; the slots are a finite shared resource and a
//! single candidate must not see N x M simultaneous probes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{ServerKey, BAD_STATUS, NOT_ALIVE};
use crate::pool::SlotAssignment;

/// Outcome of one probe request. Kept as an enum internally so "really slow"
/// and "failed" stay distinguishable until the sentinel conversion at the
/// merge boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeOutcome {
    Ok(f64),
    BadStatus(u16),
    Failed,
}

impl ProbeOutcome {
    /// Sentinel encoding used by the ranking contract.
    pub fn as_latency(&self) -> f64 {
        match self {
            ProbeOutcome::Ok(elapsed) => *elapsed,
            ProbeOutcome::BadStatus(_) => BAD_STATUS,
            ProbeOutcome::Failed => NOT_ALIVE,
        }
    }
}

pub struct HttpProber {
    timeout: Duration,
    semaphore: Arc<Semaphore>,
}

impl HttpProber {
    pub fn new(timeout: Duration, max_concurrent_requests: usize) -> Self {
        Self {
            timeout,
            semaphore: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
        }
    }

    /// Probe every target URL through every assigned slot in the chunk.
    /// Per-request failures become sentinels; the only error path is a
    /// client that cannot even be constructed for a slot, which is also
    /// recorded as failed URLs rather than propagated.
    pub async fn check(
        &self,
        assignments: &[SlotAssignment],
        urls: &[String],
    ) -> HashMap<ServerKey, HashMap<String, f64>> {
        let results: Vec<(ServerKey, HashMap<String, f64>)> =
            futures::stream::iter(assignments)
                .map(|assignment| async move {
                    let times = self.check_slot(assignment, urls).await;
                    (assignment.server.key(), times)
                })
                .buffer_unordered(assignments.len().max(1))
                .collect()
                .await;

        results.into_iter().collect()
    }

    async fn check_slot(
        &self,
        assignment: &SlotAssignment,
        urls: &[String],
    ) -> HashMap<String, f64> {
        let client = match self.slot_client(assignment.local_port) {
            Ok(client) => client,
            Err(e) => {
                warn!(
                    "Failed to build client for slot {}: {}",
                    assignment.slot_index, e
                );
                return urls.iter().map(|u| (u.clone(), NOT_ALIVE)).collect();
            }
        };
        debug!(
            "Using proxy on port {} for server {}",
            assignment.local_port,
            assignment.server.key()
        );
        self.check_urls(&client, urls).await
    }

    /// Fan out one GET per URL under the chunk-global admission gate.
    async fn check_urls(
        &self,
        client: &reqwest::Client,
        urls: &[String],
    ) -> HashMap<String, f64> {
        let outcomes: Vec<(String, ProbeOutcome)> = futures::stream::iter(urls)
            .map(|url| {
                let client = client.clone();
                let semaphore = self.semaphore.clone();
                async move {
                    let _permit = semaphore.acquire().await;
                    let outcome = probe_url(&client, url).await;
                    (url.clone(), outcome)
                }
            })
            .buffer_unordered(urls.len().max(1))
            .collect()
            .await;

        outcomes
            .into_iter()
            .map(|(url, outcome)| (url, outcome.as_latency()))
            .collect()
    }

    fn slot_client(&self, local_port: u16) -> Result<reqwest::Client> {
        let proxy = reqwest::Proxy::all(format!("socks5://127.0.0.1:{}", local_port))?;
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(self.timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(client)
    }
}

/// Issue one GET and time it. Body is drained so the measurement covers the
/// full response, matching how clients experience the proxy.
pub async fn probe_url(client: &reqwest::Client, url: &str) -> ProbeOutcome {
    let start = Instant::now();
    match client.get(url).send().await {
        Ok(response) => {
            let status = response.status();
            if !(status.is_success() || status.is_redirection()) {
                warn!("URL {} returned status {}", url, status);
                return ProbeOutcome::BadStatus(status.as_u16());
            }
            match response.bytes().await {
                Ok(_) => {
                    let elapsed = start.elapsed().as_secs_f64();
                    debug!("URL: {}, elapsed: {:.3}s", url, elapsed);
                    ProbeOutcome::Ok(elapsed)
                }
                Err(e) => {
                    warn!("Error reading body from {}: {}", url, e);
                    ProbeOutcome::Failed
                }
            }
        }
        Err(e) => {
            warn!("Error fetching URL {}: {}", url, e);
            ProbeOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal one-shot HTTP server returning a fixed status line.
    async fn serve_once(status_line: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let response = format!(
                    "{}\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
                    status_line
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        port
    }

    fn plain_client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_probe_url_success_measures_elapsed() {
        let port = serve_once("HTTP/1.1 200 OK").await;
        let outcome = probe_url(&plain_client(), &format!("http://127.0.0.1:{}/", port)).await;
        match outcome {
            ProbeOutcome::Ok(elapsed) => assert!(elapsed < NOT_ALIVE),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_probe_url_bad_status() {
        let port = serve_once("HTTP/1.1 503 Service Unavailable").await;
        let outcome = probe_url(&plain_client(), &format!("http://127.0.0.1:{}/", port)).await;
        assert_eq!(outcome, ProbeOutcome::BadStatus(503));
        assert_eq!(outcome.as_latency(), BAD_STATUS);
    }

    #[tokio::test]
    async fn test_probe_url_connection_error_is_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let outcome = probe_url(&plain_client(), &format!("http://127.0.0.1:{}/", port)).await;
        assert_eq!(outcome, ProbeOutcome::Failed);
        assert_eq!(outcome.as_latency(), NOT_ALIVE);
    }

    /// Server that answers every request only after a delay and records the
    /// peak number of simultaneously unanswered requests. A request stays
    /// unanswered for the full delay, so the recorded peak is exactly the
    /// number of probes in flight at once.
    async fn serve_slow(delay: Duration) -> (u16, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let observed = peak.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let active = active.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                    let response =
                        "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok";
                    let _ = stream.write_all(response.as_bytes()).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });
        (port, observed)
    }

    #[tokio::test]
    async fn test_admission_gate_bounds_in_flight_requests() {
        let (port, peak) = serve_slow(Duration::from_millis(200)).await;
        let urls: Vec<String> = (0..6)
            .map(|i| format!("http://127.0.0.1:{}/{}", port, i))
            .collect();

        let prober = HttpProber::new(Duration::from_secs(5), 2);
        let times = prober.check_urls(&plain_client(), &urls).await;

        assert_eq!(times.len(), 6);
        assert!(times.values().all(|&t| t < NOT_ALIVE));
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failure_sentinels_are_distinguishable_and_dominant() {
        assert_ne!(
            ProbeOutcome::BadStatus(500).as_latency(),
            ProbeOutcome::Failed.as_latency()
        );
        assert!(ProbeOutcome::BadStatus(500).as_latency() >= NOT_ALIVE);
        assert!(ProbeOutcome::Failed.as_latency() >= NOT_ALIVE);
    }
}
