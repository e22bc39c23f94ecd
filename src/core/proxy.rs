//! Reverse-proxy routes published over the proxy relation.

use crate::core::resolver::ResolvedConfiguration;
use serde::Serialize;

/// One forwarding rule for the reverse proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyRoute {
    /// `http` or `tcp`
    pub mode: String,
    pub external_port: u16,
    pub internal_host: String,
    pub internal_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
}

/// HTTP and SSH routes pointing at `internal_host`.
#[must_use]
pub fn proxy_routes(resolved: &ResolvedConfiguration, internal_host: &str) -> Vec<ProxyRoute> {
    let external_http_port = if resolved.external_scheme() == "https" {
        443
    } else {
        80
    };

    vec![
        ProxyRoute {
            mode: "http".to_string(),
            external_port: external_http_port,
            internal_host: internal_host.to_string(),
            internal_port: resolved.http_port,
            subdomain: resolved.external_host(),
        },
        ProxyRoute {
            mode: "tcp".to_string(),
            external_port: resolved.proxy_ssh_port,
            internal_host: internal_host.to_string(),
            internal_port: resolved.local_ssh_port,
            subdomain: None,
        },
    ]
}
