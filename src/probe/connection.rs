//! Raw TCP connectivity probing
//!
//! Cheap reachability check used to discard dead endpoints before the
//! expensive HTTP-through-proxy stage. Never touches the engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use crate::models::{Server, ServerKey, NOT_ALIVE};

pub struct ConnectionProber {
    timeout: Duration,
    semaphore: Arc<Semaphore>,
}

impl ConnectionProber {
    pub fn new(timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            timeout,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Measure the TCP connect time of every candidate. Failure is data: a
    /// timed-out or refused connection yields the [`NOT_ALIVE`] sentinel,
    /// never an error. Results are keyed by candidate identity; completion
    /// order carries no meaning.
    pub async fn probe(&self, servers: &[Server]) -> HashMap<ServerKey, f64> {
        let results: Vec<(ServerKey, f64)> = futures::stream::iter(servers)
            .map(|server| {
                let semaphore = self.semaphore.clone();
                async move {
                    let _permit = semaphore.acquire().await;
                    let elapsed = self.connect_time(&server.address, server.port).await;
                    (server.key(), elapsed)
                }
            })
            .buffer_unordered(servers.len().max(1))
            .collect()
            .await;

        results.into_iter().collect()
    }

    async fn connect_time(&self, address: &str, port: u16) -> f64 {
        let start = Instant::now();
        match timeout(self.timeout, TcpStream::connect((address, port))).await {
            Ok(Ok(_stream)) => {
                // Millisecond precision, like the ranking expects.
                let elapsed = (start.elapsed().as_secs_f64() * 1000.0).round() / 1000.0;
                debug!("Connection time to {}:{}: {}", address, port, elapsed);
                elapsed
            }
            Ok(Err(e)) => {
                warn!("Failed to connect to {}:{}: {}", address, port, e);
                NOT_ALIVE
            }
            Err(_) => {
                warn!("Connection to {}:{} timed out", address, port);
                NOT_ALIVE
            }
        }
    }
}
