//! External proxy engine interface
//!
//! The engine performs the actual protocol-level proxying and is configured
//! dynamically over its control API. This module owns the interface seam
//! ([`EngineControl`]), a JSON-over-HTTP client implementation, and the
//! engine process lifecycle.

pub mod api;
pub mod process;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Server;

/// Control API of the external proxy engine.
///
/// Implementations must map an unreachable control API to
/// [`TopVpnError::EngineUnavailable`](crate::error::TopVpnError::EngineUnavailable)
/// (fatal for the run) and a per-call rejection to
/// [`TopVpnError::SlotConfiguration`](crate::error::TopVpnError::SlotConfiguration)
/// (local to one slot).
#[async_trait]
pub trait EngineControl: Send + Sync {
    /// Register an outbound route `tag` pointing at the candidate's endpoint.
    async fn add_outbound(&self, tag: &str, server: &Server) -> Result<()>;

    /// Remove a previously added outbound.
    async fn remove_outbound(&self, tag: &str) -> Result<()>;

    /// Register a local SOCKS5 inbound listener on `local_port`.
    async fn add_inbound(&self, tag: &str, local_port: u16) -> Result<()>;

    /// Route traffic arriving on `inbound_tag` to `outbound_tag`.
    async fn add_routing_rule(
        &self,
        inbound_tag: &str,
        outbound_tag: &str,
        rule_tag: &str,
    ) -> Result<()>;

    /// Remove a routing rule.
    async fn remove_routing_rule(&self, rule_tag: &str) -> Result<()>;
}

pub use api::EngineApi;
pub use process::EngineProcess;
