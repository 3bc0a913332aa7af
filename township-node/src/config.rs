//! Node configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use township_lifecycle::LifecycleConfig;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// Engine settings: `[lifecycle.escalation]`, `[lifecycle.fanout]`
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub inbox: InboxConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name reported by the health endpoint
    #[serde(default = "default_node_name")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener to
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// HTTP port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Buffered notifications per SSE client before it starts lagging
    #[serde(default = "default_stream_capacity")]
    pub stream_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxConfig {
    /// Notifications kept per report, oldest dropped first
    #[serde(default = "default_inbox_capacity")]
    pub max_per_report: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: default_node_name(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            http_port: default_http_port(),
            stream_capacity: default_stream_capacity(),
        }
    }
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            max_per_report: default_inbox_capacity(),
        }
    }
}

fn default_node_name() -> String { "township-node".to_string() }
fn default_bind_address() -> IpAddr { IpAddr::V4(Ipv4Addr::UNSPECIFIED) }
fn default_http_port() -> u16 { 8080 }
fn default_stream_capacity() -> usize { 256 }
fn default_inbox_capacity() -> usize { 100 }

impl Config {
    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load from `path`, or use defaults if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.lifecycle.validate()?;
        if self.inbox.max_per_report == 0 {
            anyhow::bail!("inbox.max_per_report must be at least 1");
        }
        if self.api.stream_capacity == 0 {
            anyhow::bail!("api.stream_capacity must be at least 1");
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.api.bind_address, self.api.http_port)
    }
}
