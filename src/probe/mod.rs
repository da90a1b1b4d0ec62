//! Probing stages
//!
//! Two independent stages with separate admission gates: raw TCP connect
//! timing (no engine) and HTTP latency through assigned proxy slots. They
//! bound different physical resources and share nothing.

pub mod connection;
pub mod http;

pub use connection::ConnectionProber;
pub use http::{HttpProber, ProbeOutcome};
