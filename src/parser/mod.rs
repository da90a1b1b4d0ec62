//! Candidate URL parsing
//!
//! Dispatches on the URL scheme to a protocol-specific parser. Adding a
//! protocol means adding one entry to [`PARSERS`], nothing in the pipeline
//! changes.

pub mod vless;

use tracing::debug;
use url::Url;

use crate::error::{Result, TopVpnError};
use crate::models::Server;

type ParseFn = fn(&Url, &str) -> Result<Server>;

/// Scheme -> parser dispatch table.
pub const PARSERS: &[(&str, ParseFn)] = &[("vless", vless::parse_url)];

/// Schemes this build can parse, in table order.
pub fn supported_schemes() -> Vec<&'static str> {
    PARSERS.iter().map(|(scheme, _)| *scheme).collect()
}

/// Parse a raw candidate URL into a [`Server`], recording which subscription
/// it came from.
pub fn parse_server_url(raw: &str, origin: &str) -> Result<Server> {
    debug!("Parsing server URL: {}", raw);
    let url = Url::parse(raw).map_err(|e| TopVpnError::Parse(format!("{}: {}", raw, e)))?;

    let parser = PARSERS
        .iter()
        .find(|(scheme, _)| *scheme == url.scheme())
        .map(|(_, parse)| parse)
        .ok_or_else(|| TopVpnError::UnsupportedProtocol(raw.to_string()))?;

    parser(&url, origin)
}
