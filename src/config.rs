use std::env;
use std::path::PathBuf;

use crate::error::{Result, TopVpnError};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Subscription fetching configuration
    pub subscription: SubscriptionConfig,
    /// Raw TCP connectivity probe configuration
    pub connection_probe: ConnectionProbeConfig,
    /// HTTP-through-proxy probe configuration
    pub http_probe: HttpProbeConfig,
    /// External proxy engine configuration
    pub engine: EngineConfig,
    /// Export/dump configuration
    pub export: ExportConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// File with one subscription URL per line
    pub file: PathBuf,
    /// Fetch timeout in seconds
    pub timeout: u64,
    /// Keep only candidates on port 443
    pub only_443_port: bool,
}

#[derive(Debug, Clone)]
pub struct ConnectionProbeConfig {
    /// Per-candidate connect timeout in seconds
    pub timeout: u64,
    /// Maximum in-flight TCP connection attempts
    pub max_concurrent: usize,
}

#[derive(Debug, Clone)]
pub struct HttpProbeConfig {
    /// Per-request timeout in seconds
    pub timeout: u64,
    /// Maximum in-flight HTTP requests across a chunk
    pub max_concurrent_requests: usize,
    /// Target URLs probed through each slot
    pub probe_urls: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Control API endpoint, e.g. http://127.0.0.1:8080
    pub api_url: String,
    /// Path to the engine binary (started if not running)
    pub binary_path: PathBuf,
    /// Number of proxy slots (inbound listeners, chunk size)
    pub pool_size: usize,
    /// First local SOCKS listening port; slot k listens on base + k
    pub base_port: u16,
    /// Milliseconds to wait before removing a chunk's outbounds
    pub release_grace_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Output path for the ranked subscription file
    pub subscription_file: PathBuf,
    /// Directory for JSON server dumps
    pub dumps_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
}

/// Default target URLs for HTTP probing
const DEFAULT_PROBE_URLS: &[&str] = &[
    "https://instagram.com",
    "https://chatgpt.com",
    "http://cp.cloudflare.com/",
    "https://www.google.com/gen_204",
];

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let pool_size: usize = get_env_or("ENGINE_POOL_SIZE", "50").parse().map_err(|_| {
            TopVpnError::InvalidConfig("ENGINE_POOL_SIZE must be a valid number".into())
        })?;
        let base_port: u16 = get_env_or("ENGINE_BASE_PORT", "60000").parse().map_err(|_| {
            TopVpnError::InvalidConfig("ENGINE_BASE_PORT must be a valid port number".into())
        })?;
        // Slot k listens on base_port + k; the whole pool must fit in u16.
        if base_port as u64 + pool_size as u64 > 65536 {
            return Err(TopVpnError::InvalidConfig(format!(
                "ENGINE_BASE_PORT {} plus ENGINE_POOL_SIZE {} exceeds port 65535",
                base_port, pool_size
            )));
        }

        Ok(Config {
            subscription: SubscriptionConfig {
                file: get_env_or("SUBSCRIPTION_FILE", "subscriptions.txt").into(),
                timeout: get_env_or("SUBSCRIPTION_TIMEOUT", "5").parse().unwrap_or(5),
                only_443_port: get_env_or("SUBSCRIPTION_ONLY_443_PORT", "false")
                    .parse()
                    .unwrap_or(false),
            },
            connection_probe: ConnectionProbeConfig {
                timeout: get_env_or("CONNECTION_PROBE_TIMEOUT", "1").parse().unwrap_or(1),
                max_concurrent: get_env_or("CONNECTION_PROBE_MAX_CONCURRENT", "50")
                    .parse()
                    .unwrap_or(50),
            },
            http_probe: HttpProbeConfig {
                timeout: get_env_or("HTTP_PROBE_TIMEOUT", "5").parse().unwrap_or(5),
                max_concurrent_requests: get_env_or("HTTP_PROBE_MAX_CONCURRENT_REQUESTS", "200")
                    .parse()
                    .unwrap_or(200),
                probe_urls: parse_probe_urls(),
            },
            engine: EngineConfig {
                api_url: get_env_or("ENGINE_API_URL", "http://127.0.0.1:8080"),
                binary_path: get_env_or("ENGINE_BINARY", "xray/xray").into(),
                pool_size,
                base_port,
                release_grace_ms: get_env_or("ENGINE_RELEASE_GRACE_MS", "500")
                    .parse()
                    .unwrap_or(500),
            },
            export: ExportConfig {
                subscription_file: get_env_or("EXPORT_SUBSCRIPTION_FILE", "subscription.txt")
                    .into(),
                dumps_dir: get_env_or("EXPORT_DUMPS_DIR", "dumps").into(),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
            },
        })
    }
}

fn parse_probe_urls() -> Vec<String> {
    let raw = env::var("HTTP_PROBE_URLS").unwrap_or_default();
    let urls: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if urls.is_empty() {
        DEFAULT_PROBE_URLS.iter().map(|s| s.to_string()).collect()
    } else {
        urls
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
