use std::collections::HashMap;

use url::Url;

use crate::error::{Result, TopVpnError};
use crate::models::{Measurement, Protocol, Server, ServerParams, VlessParams};

/// Parse a `vless://identity@host:port?...#label` URL into a [`Server`].
pub fn parse_url(url: &Url, origin: &str) -> Result<Server> {
    let address = url
        .host_str()
        .ok_or_else(|| TopVpnError::Parse(format!("missing host in link: {}", url)))?
        .to_string();
    let port = url
        .port()
        .ok_or_else(|| TopVpnError::Parse(format!("missing port in link: {}", url)))?;
    let identity = url.username().to_string();

    let params = parse_params(url);

    Ok(Server {
        protocol: Protocol::Vless,
        address,
        port,
        identity,
        params: ServerParams::Vless(params),
        raw_url: url.as_str().to_string(),
        origin: origin.to_string(),
        measurement: Measurement::default(),
    })
}

fn parse_params(url: &Url) -> VlessParams {
    let mut query: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in url.query_pairs() {
        query
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }

    let get = |key: &str| -> String {
        query
            .get(key)
            .and_then(|v| v.first())
            .cloned()
            .unwrap_or_default()
    };
    let get_or = |key: &str, default: &str| -> String {
        let value = get(key);
        if value.is_empty() {
            default.to_string()
        } else {
            value
        }
    };

    VlessParams {
        sni: get("sni"),
        pbk: get("pbk"),
        security: get_or("security", "none"),
        transport_type: get_or("type", "tcp"),
        fp: get("fp"),
        path: get_or("path", "/"),
        service_name: get("serviceName"),
        host: get("host"),
        alpn: query.get("alpn").cloned(),
        sid: get("sid"),
        flow: get("flow"),
    }
}
