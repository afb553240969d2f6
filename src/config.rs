//! Configuration types for docker-dns.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// DNS server configuration.
    pub dns: DnsConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// DNS server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Address for the DNS server to listen on (UDP and TCP).
    pub listen_addr: SocketAddr,

    /// Docker daemon endpoint (`unix://...` or an HTTP/TCP address).
    #[serde(default = "default_docker_endpoint")]
    pub docker_endpoint: String,

    /// TTL for answered records in seconds.
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Zone suffixes this server claims authority over, in addition to the
    /// suffix domains configured on the resolver chain.
    #[serde(default)]
    pub zones: Vec<String>,

    /// Ordered naming-strategy chain.
    pub resolvers: Vec<ResolverSpec>,

    /// SOA record configuration.
    #[serde(default)]
    pub soa: SoaConfig,
}

impl DnsConfig {
    /// All zone suffixes to serve: explicit `zones` first, then the suffix
    /// domains of the resolver chain, deduplicated in order.
    pub fn zone_names(&self, chain_suffixes: &[String]) -> Vec<String> {
        let mut zones: Vec<String> = Vec::new();
        for zone in self.zones.iter().map(|z| z.trim_end_matches('.')) {
            if !zone.is_empty() && !zones.iter().any(|existing| existing == zone) {
                zones.push(zone.to_string());
            }
        }
        for suffix in chain_suffixes {
            if !zones.iter().any(|existing| existing == suffix) {
                zones.push(suffix.clone());
            }
        }
        zones
    }
}

/// One naming strategy in the resolver chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ResolverSpec {
    /// `<container name>.<domain>`.
    ContainerName {
        /// Suffix domain to append.
        domain: String,
    },
    /// `<hostname>.<domain>`.
    Hostname {
        /// Suffix domain to append.
        domain: String,
    },
    /// The value of one label, used verbatim as a domain.
    Label {
        /// Label key to look for.
        #[serde(default = "default_host_label")]
        key: String,
    },
    /// Network-scoped aliases.
    NetworkAliases {
        /// Restrict to one network; all attached networks when unset.
        #[serde(default)]
        network: Option<String>,
    },
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "docker_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

/// SOA (Start of Authority) record configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoaConfig {
    /// Primary nameserver hostname (e.g., "ns1.example.com").
    pub mname: String,

    /// Admin email in DNS format (e.g., "admin.example.com").
    pub rname: String,

    /// Refresh interval in seconds.
    #[serde(default = "default_refresh")]
    pub refresh: u32,

    /// Retry interval in seconds.
    #[serde(default = "default_retry")]
    pub retry: u32,

    /// Expire time in seconds.
    #[serde(default = "default_expire")]
    pub expire: u32,

    /// Minimum TTL in seconds.
    #[serde(default = "default_minimum")]
    pub minimum: u32,
}

impl Default for SoaConfig {
    fn default() -> Self {
        Self {
            mname: "ns1.example.com".to_string(),
            rname: "admin.example.com".to_string(),
            refresh: default_refresh(),
            retry: default_retry(),
            expire: default_expire(),
            minimum: default_minimum(),
        }
    }
}

fn default_docker_endpoint() -> String {
    "unix:///var/run/docker.sock".to_string()
}

fn default_host_label() -> String {
    "docker-dns.host".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ttl() -> u32 {
    3600
}

fn default_refresh() -> u32 {
    3600
}

fn default_retry() -> u32 {
    600
}

fn default_expire() -> u32 {
    604800
}

fn default_minimum() -> u32 {
    60
}
