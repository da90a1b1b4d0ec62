use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::engine::EngineControl;
use crate::error::{Result, TopVpnError};
use crate::models::{Server, ServerParams, VlessParams};

/// JSON-over-HTTP client for the engine's control API.
pub struct EngineApi {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct OutboundRequest<'a> {
    tag: &'a str,
    protocol: &'a str,
    address: &'a str,
    port: u16,
    identity: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    flow: Option<&'a str>,
    stream: StreamSettings,
}

#[derive(Debug, Serialize)]
struct StreamSettings {
    network: String,
    security: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alpn: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    short_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct InboundRequest<'a> {
    tag: &'a str,
    protocol: &'a str,
    listen: &'a str,
    port: u16,
    udp_enabled: bool,
    sniffing: bool,
}

#[derive(Debug, Serialize)]
struct RoutingRuleRequest<'a> {
    rule_tag: &'a str,
    inbound_tag: &'a str,
    outbound_tag: &'a str,
    networks: &'a [&'a str],
}

impl EngineApi {
    pub fn new(api_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .no_proxy()
            .build()
            .unwrap_or_default();
        Self {
            base_url: api_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// POST a config object, classifying transport failures as fatal and
    /// engine-side rejections as local to the given tag.
    async fn post<T: Serialize>(&self, path: &str, tag: &str, body: &T) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| TopVpnError::EngineUnavailable(format!("{}: {}", url, e)))?;

        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        let reason = response.text().await.unwrap_or_default();
        Err(TopVpnError::SlotConfiguration {
            tag: tag.to_string(),
            reason: format!("{} ({})", reason.trim(), status),
        })
    }

    async fn delete(&self, path: &str, tag: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| TopVpnError::EngineUnavailable(format!("{}: {}", url, e)))?;

        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        Err(TopVpnError::SlotConfiguration {
            tag: tag.to_string(),
            reason: format!("delete rejected ({})", status),
        })
    }
}

#[async_trait]
impl EngineControl for EngineApi {
    async fn add_outbound(&self, tag: &str, server: &Server) -> Result<()> {
        let ServerParams::Vless(params) = &server.params;
        let request = OutboundRequest {
            tag,
            protocol: server.protocol.as_str(),
            address: &server.address,
            port: server.port,
            identity: &server.identity,
            flow: (!params.flow.is_empty()).then_some(params.flow.as_str()),
            stream: build_stream_settings(params),
        };
        self.post("/outbounds", tag, &request).await?;
        info!("Added outbound {}", tag);
        Ok(())
    }

    async fn remove_outbound(&self, tag: &str) -> Result<()> {
        self.delete(&format!("/outbounds/{}", tag), tag).await?;
        debug!("Removed outbound {}", tag);
        Ok(())
    }

    async fn add_inbound(&self, tag: &str, local_port: u16) -> Result<()> {
        let request = InboundRequest {
            tag,
            protocol: "socks",
            listen: "127.0.0.1",
            port: local_port,
            udp_enabled: true,
            sniffing: true,
        };
        self.post("/inbounds", tag, &request).await?;
        info!("Added inbound {} on port {}", tag, local_port);
        Ok(())
    }

    async fn add_routing_rule(
        &self,
        inbound_tag: &str,
        outbound_tag: &str,
        rule_tag: &str,
    ) -> Result<()> {
        let request = RoutingRuleRequest {
            rule_tag,
            inbound_tag,
            outbound_tag,
            networks: &["tcp", "udp"],
        };
        self.post("/routing/rules", rule_tag, &request).await?;
        info!("Added rule {}", rule_tag);
        Ok(())
    }

    async fn remove_routing_rule(&self, rule_tag: &str) -> Result<()> {
        self.delete(&format!("/routing/rules/{}", rule_tag), rule_tag)
            .await?;
        debug!("Removed rule {}", rule_tag);
        Ok(())
    }
}

/// Build the transport/security section of an outbound from the candidate's
/// URL parameters. Unknown transport types fall back to plain TCP.
fn build_stream_settings(params: &VlessParams) -> StreamSettings {
    let mut stream = StreamSettings {
        network: "tcp".to_string(),
        security: params.security.to_lowercase(),
        path: None,
        service_name: None,
        host: None,
        server_name: None,
        alpn: None,
        fingerprint: None,
        public_key: None,
        short_id: None,
    };

    match params.transport_type.as_str() {
        "ws" => {
            stream.network = "ws".to_string();
            stream.path = Some(params.path.clone());
            if !params.host.is_empty() {
                stream.host = Some(params.host.clone());
            }
        }
        "grpc" => {
            stream.network = "grpc".to_string();
            let service_name = if params.service_name.is_empty() {
                "grpc".to_string()
            } else {
                params.service_name.clone()
            };
            stream.service_name = Some(service_name);
            let authority = if !params.host.is_empty() {
                params.host.clone()
            } else {
                params.sni.clone()
            };
            if !authority.is_empty() {
                stream.host = Some(authority);
            }
        }
        "h2" => {
            stream.network = "http".to_string();
            if !params.host.is_empty() {
                stream.host = Some(params.host.clone());
            }
        }
        _ => {}
    }

    match stream.security.as_str() {
        "tls" => {
            if !params.sni.is_empty() {
                stream.server_name = Some(params.sni.clone());
            }
            stream.alpn = params.alpn.clone();
            if !params.fp.is_empty() {
                stream.fingerprint = Some(params.fp.clone());
            }
        }
        "reality" => {
            if !params.sni.is_empty() {
                stream.server_name = Some(params.sni.clone());
            }
            if !params.pbk.is_empty() {
                stream.public_key = Some(params.pbk.clone());
            }
            if !params.sid.is_empty() {
                stream.short_id = Some(params.sid.clone());
            }
            if !params.fp.is_empty() {
                stream.fingerprint = Some(params.fp.clone());
            }
        }
        _ => {}
    }

    stream
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reality_params() -> VlessParams {
        VlessParams {
            sni: "cdn.example".to_string(),
            pbk: "publickey".to_string(),
            security: "reality".to_string(),
            transport_type: "grpc".to_string(),
            fp: "chrome".to_string(),
            path: "/".to_string(),
            service_name: "svc".to_string(),
            host: String::new(),
            alpn: None,
            sid: "0123".to_string(),
            flow: "xtls-rprx-vision".to_string(),
        }
    }

    #[test]
    fn test_stream_settings_reality_grpc() {
        let stream = build_stream_settings(&reality_params());
        assert_eq!(stream.network, "grpc");
        assert_eq!(stream.security, "reality");
        assert_eq!(stream.service_name.as_deref(), Some("svc"));
        // grpc authority falls back to sni when host is unset
        assert_eq!(stream.host.as_deref(), Some("cdn.example"));
        assert_eq!(stream.public_key.as_deref(), Some("publickey"));
        assert_eq!(stream.short_id.as_deref(), Some("0123"));
        assert_eq!(stream.fingerprint.as_deref(), Some("chrome"));
    }

    #[test]
    fn test_stream_settings_ws_tls() {
        let mut params = reality_params();
        params.security = "tls".to_string();
        params.transport_type = "ws".to_string();
        params.path = "/tunnel".to_string();
        params.alpn = Some(vec!["h2".to_string()]);

        let stream = build_stream_settings(&params);
        assert_eq!(stream.network, "ws");
        assert_eq!(stream.security, "tls");
        assert_eq!(stream.path.as_deref(), Some("/tunnel"));
        assert_eq!(stream.server_name.as_deref(), Some("cdn.example"));
        assert_eq!(stream.alpn, Some(vec!["h2".to_string()]));
        assert!(stream.public_key.is_none());
    }

    #[test]
    fn test_stream_settings_plain_tcp_default() {
        let params = VlessParams {
            security: "none".to_string(),
            transport_type: "tcp".to_string(),
            path: "/".to_string(),
            ..VlessParams::default()
        };
        let stream = build_stream_settings(&params);
        assert_eq!(stream.network, "tcp");
        assert_eq!(stream.security, "none");
        assert!(stream.path.is_none());
        assert!(stream.server_name.is_none());
    }
}
