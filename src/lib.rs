//! TopVPN - Subscription Proxy Prober
//!
//! Discovers proxy server candidates from subscription feeds, probes them,
//! and ranks the survivors by measured latency.
//!
//! ## Pipeline
//!
//! - Fetch subscription feeds and parse candidate URLs (deduplicated by
//!   endpoint + identity)
//! - Raw TCP connect timing to discard dead endpoints cheaply
//! - HTTP latency through a fixed pool of proxy slots on the external
//!   forwarding engine, chunk by chunk
//! - Rank by connection time and aggregate HTTP time; export the result

pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod manager;
pub mod models;
pub mod parser;
pub mod pool;
pub mod probe;
pub mod ranking;
pub mod subscription;

pub use config::Config;
pub use error::{Result, TopVpnError};
pub use manager::ServerManager;
