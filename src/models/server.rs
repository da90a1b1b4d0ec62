use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Latency recorded for a candidate that never answered (timeout or
/// transport error). Larger than any genuine measurement.
pub const NOT_ALIVE: f64 = 999.0;

/// Latency recorded for an HTTP probe that answered with a status outside
/// the 2xx/3xx class. Distinct from [`NOT_ALIVE`] so the failure classes stay
/// distinguishable, but still large enough to poison the alive-by-http sum.
pub const BAD_STATUS: f64 = 1000.0;

/// Proxy protocol of a candidate server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Vless,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Vless => "vless",
        }
    }

    pub fn from_scheme(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "vless" => Some(Protocol::Vless),
            _ => None,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// VLESS transport and security parameters from the URL query string
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VlessParams {
    pub sni: String,
    pub pbk: String,
    pub security: String,
    pub transport_type: String,
    pub fp: String,
    pub path: String,
    pub service_name: String,
    pub host: String,
    pub alpn: Option<Vec<String>>,
    pub sid: String,
    pub flow: String,
}

/// Protocol-specific outbound parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum ServerParams {
    Vless(VlessParams),
}

/// Dedup and result-merge key: two servers are the same candidate iff
/// address, port, and identity match. Query parameter differences on an
/// otherwise-identical endpoint are not distinguishing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerKey {
    pub address: String,
    pub port: u16,
    pub identity: String,
}

impl std::fmt::Display for ServerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Measured probe results for a candidate. Both fields start at [`NOT_ALIVE`]
/// sentinels and are overwritten by the merge step after each probing stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Raw TCP connect time in seconds, millisecond precision
    pub connection_time: f64,
    /// Per-target-URL HTTP response time in seconds
    pub http_times: HashMap<String, f64>,
}

impl Default for Measurement {
    fn default() -> Self {
        Self {
            connection_time: NOT_ALIVE,
            http_times: HashMap::new(),
        }
    }
}

impl Measurement {
    /// Aggregate HTTP metric: the sum over all probed URLs. A single failed
    /// URL dominates the sum because its sentinel is >= [`NOT_ALIVE`].
    pub fn http_time_total(&self) -> f64 {
        self.http_times.values().sum()
    }
}

/// A parsed, testable proxy server candidate.
///
/// The connection fields are immutable once parsed; only `measurement` is
/// updated, and only by the manager's merge step.
#[derive(Debug, Clone)]
pub struct Server {
    pub protocol: Protocol,
    pub address: String,
    pub port: u16,
    /// Credential/user identifier; part of candidate identity and of the
    /// engine's outbound account configuration.
    pub identity: String,
    pub params: ServerParams,
    pub raw_url: String,
    /// Subscription URL this candidate came from
    pub origin: String,
    pub measurement: Measurement,
}

impl Server {
    pub fn key(&self) -> ServerKey {
        ServerKey {
            address: self.address.clone(),
            port: self.port,
            identity: self.identity.clone(),
        }
    }

    pub fn vless_params(&self) -> &VlessParams {
        match &self.params {
            ServerParams::Vless(p) => p,
        }
    }
}

impl PartialEq for Server {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
            && self.port == other.port
            && self.identity == other.identity
    }
}

impl Eq for Server {}

impl Hash for Server {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
        self.port.hash(state);
        self.identity.hash(state);
    }
}

impl std::fmt::Display for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.address, self.port)
    }
}
