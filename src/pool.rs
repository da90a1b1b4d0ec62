//! Proxy slot pool
//!
//! Bridges the fixed set of local proxy slots on the external engine and an
//! unbounded stream of candidates. Slot `k` is one (local port, inbound tag,
//! routing rule, outbound tag) unit: the inbound and rule are registered once
//! per run, the outbound is reassigned per chunk.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::engine::EngineControl;
use crate::error::Result;
use crate::models::Server;

/// One slot currently routing to a candidate. Exists only for the duration
/// of a chunk; owned by the pool.
#[derive(Debug, Clone)]
pub struct SlotAssignment {
    pub slot_index: usize,
    pub local_port: u16,
    pub outbound_tag: String,
    pub server: Server,
}

pub struct SlotPool {
    engine: Arc<dyn EngineControl>,
    pool_size: usize,
    base_port: u16,
    release_grace: Duration,
}

impl SlotPool {
    pub fn new(
        engine: Arc<dyn EngineControl>,
        pool_size: usize,
        base_port: u16,
        release_grace: Duration,
    ) -> Self {
        // Slot k listens on base_port + k; cap the pool so every slot port
        // stays within u16.
        Self {
            engine,
            pool_size: pool_size.clamp(1, 65536 - base_port as usize),
            base_port,
            release_grace,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Register the fixed skeleton: N socks inbounds on `base_port + k` and
    /// N routing rules `inbound{k} -> outbound{k}`. Called once per run; any
    /// failure here is fatal, no candidate has been probed yet.
    pub async fn setup(&self) -> Result<()> {
        for k in 0..self.pool_size {
            let inbound_tag = format!("inbound{}", k);
            let outbound_tag = format!("outbound{}", k);
            let rule_tag = format!("rule{}", k);
            self.engine
                .add_inbound(&inbound_tag, self.base_port + k as u16)
                .await?;
            self.engine
                .add_routing_rule(&inbound_tag, &outbound_tag, &rule_tag)
                .await?;
        }
        info!(
            "Slot pool ready: {} slots on ports {}..{}",
            self.pool_size,
            self.base_port,
            self.base_port as u32 + self.pool_size as u32 - 1
        );
        Ok(())
    }

    /// Partition `servers` into chunks of at most `pool_size` and run `probe`
    /// over each chunk's slot assignments. Outbounds added for a chunk are
    /// removed before the next chunk claims its slots, on success and on
    /// error alike.
    pub async fn run_chunks<F, Fut, T>(&self, servers: &[Server], mut probe: F) -> Result<Vec<T>>
    where
        F: FnMut(Vec<SlotAssignment>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut outputs = Vec::new();
        for (chunk_index, chunk) in servers.chunks(self.pool_size).enumerate() {
            debug!(
                "Processing chunk {} of {} servers",
                chunk_index,
                chunk.len()
            );
            let assignments = self.assign_chunk(chunk).await?;
            let released_tags: Vec<String> = assignments
                .iter()
                .map(|a| a.outbound_tag.clone())
                .collect();

            let result = probe(assignments).await;
            self.release(&released_tags).await;
            outputs.push(result?);
        }
        info!("Finished probing all server chunks");
        Ok(outputs)
    }

    /// Add one outbound per candidate in the chunk. A rejected outbound
    /// leaves that candidate unassigned for this chunk and must not abort
    /// the other slots; an unreachable engine aborts the run after the
    /// already-added outbounds are released.
    async fn assign_chunk(&self, chunk: &[Server]) -> Result<Vec<SlotAssignment>> {
        let mut assignments = Vec::with_capacity(chunk.len());
        for (slot_index, server) in chunk.iter().enumerate() {
            let outbound_tag = format!("outbound{}", slot_index);
            match self.engine.add_outbound(&outbound_tag, server).await {
                Ok(()) => assignments.push(SlotAssignment {
                    slot_index,
                    local_port: self.base_port + slot_index as u16,
                    outbound_tag,
                    server: server.clone(),
                }),
                Err(e) if e.is_fatal() => {
                    let tags: Vec<String> =
                        assignments.iter().map(|a| a.outbound_tag.clone()).collect();
                    self.release(&tags).await;
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        "Failed to assign slot {} for server {}: {}",
                        slot_index,
                        server.key(),
                        e
                    );
                }
            }
        }
        Ok(assignments)
    }

    /// Remove the outbounds added for a chunk. The grace delay lets the
    /// engine drain in-flight responses first; removal immediately after the
    /// last request can race a still-open connection.
    async fn release(&self, outbound_tags: &[String]) {
        if outbound_tags.is_empty() {
            return;
        }
        tokio::time::sleep(self.release_grace).await;
        for tag in outbound_tags {
            if let Err(e) = self.engine.remove_outbound(tag).await {
                warn!("Failed to remove outbound {}: {}", tag, e);
            }
        }
    }
}
