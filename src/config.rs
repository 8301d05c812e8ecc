//! Proxy and publisher configuration
//!
//! Both structs deserialize from YAML with every field optional:
//!
//! ```yaml
//! # proxy.yaml
//! port: 8800
//! group: 239.110.88.88
//! interface: 192.168.1.20
//! capacity: 32
//! ```
//!
//! ```yaml
//! # publisher.yaml
//! ttl: 16
//! channels:
//!   - 239.110.88.88:8800
//!   - 10.0.0.5:9800
//! ```
//!
//! Loading runs [`validate`](ProxyConfig::validate), so a config returned from
//! `from_yaml_*` is ready to use.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;
use tracing::debug;

use crate::ring::DEFAULT_RING_CAPACITY;
use crate::types::Channel;
use crate::{Result, TransportError};

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 9800;

/// Receiving side: where to listen and how many frames to buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    pub port: u16,
    /// Multicast group to join; unicast when absent
    pub group: Option<Ipv4Addr>,
    /// Local interface for the group join; kernel's choice when absent
    pub interface: Option<Ipv4Addr>,
    /// Allow other sockets on this host to bind the same port
    pub reuse_port: bool,
    /// Frame slots in the ring
    pub capacity: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            group: None,
            interface: None,
            reuse_port: true,
            capacity: DEFAULT_RING_CAPACITY,
        }
    }
}

impl ProxyConfig {
    pub fn unicast(port: u16) -> Self {
        Self { port, ..Self::default() }
    }

    pub fn multicast(group: Ipv4Addr, port: u16) -> Self {
        Self { port, group: Some(group), ..Self::default() }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_interface(mut self, interface: Ipv4Addr) -> Self {
        self.interface = Some(interface);
        self
    }

    pub fn with_reuse_port(mut self, reuse: bool) -> Self {
        self.reuse_port = reuse;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(TransportError::config("capacity must be at least 1"));
        }
        if let Some(group) = self.group.filter(|group| !group.is_multicast()) {
            return Err(TransportError::config(format!("group {group} is not a multicast address")));
        }
        if self.interface.is_some() && self.group.is_none() {
            return Err(TransportError::config("interface requires a multicast group"));
        }
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = parse_yaml(yaml, "proxy config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_yaml_str(&read_config_file(path.as_ref())?)
    }
}

/// Sending side: destinations and multicast hop limit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublisherConfig {
    /// 0 for unicast; multicast TTL otherwise
    pub ttl: u32,
    pub channels: Vec<Channel>,
}

impl PublisherConfig {
    pub fn new(ttl: u32) -> Self {
        Self { ttl, channels: Vec::new() }
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(TransportError::config("at least one channel is required"));
        }
        if self.ttl > u32::from(u8::MAX) {
            return Err(TransportError::config(format!("ttl {} exceeds 255", self.ttl)));
        }
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = parse_yaml(yaml, "publisher config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_yaml_str(&read_config_file(path.as_ref())?)
    }
}

fn read_config_file(path: &Path) -> Result<String> {
    debug!(path = %path.display(), "Loading config");
    std::fs::read_to_string(path)
        .map_err(|e| TransportError::config(format!("cannot read {}: {e}", path.display())))
}

/// Strip a byte-order mark and control characters editors sometimes leave
/// behind, then deserialize.
fn parse_yaml<T: serde::de::DeserializeOwned>(yaml: &str, what: &str) -> Result<T> {
    let cleaned: String = yaml
        .trim_start_matches('\u{feff}')
        .chars()
        .filter(|ch| !ch.is_control() || matches!(ch, '\n' | '\r' | '\t'))
        .collect();

    // An empty document deserializes to unit, not an empty mapping
    let source = if cleaned.trim().is_empty() { "{}" } else { cleaned.as_str() };
    serde_yaml_ng::from_str(source).map_err(|e| TransportError::config(format!("{what}: {e}")))
}
