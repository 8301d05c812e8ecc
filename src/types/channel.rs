//! Destination endpoint for a sender

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use crate::TransportError;

/// IPv4 address and port a [`crate::transport::Sender`] delivers to.
///
/// The address may be a unicast host or a multicast group. Immutable once
/// built; serialized as `"a.b.c.d:port"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Channel {
    addr: SocketAddrV4,
}

impl Channel {
    /// Create a channel from its parts.
    pub const fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { addr: SocketAddrV4::new(ip, port) }
    }

    pub fn ip(&self) -> Ipv4Addr {
        *self.addr.ip()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Destination group is multicast
    pub fn is_multicast(&self) -> bool {
        self.addr.ip().is_multicast()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(self.addr)
    }
}

impl FromStr for Channel {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr = s
            .trim()
            .parse::<SocketAddrV4>()
            .map_err(|e| TransportError::invalid_channel(s, e.to_string()))?;
        // 255.255.255.255 doubles as INADDR_NONE and is never a valid destination here
        if addr.ip().is_broadcast() {
            return Err(TransportError::invalid_channel(s, "broadcast address"));
        }
        Ok(Self { addr })
    }
}

impl TryFrom<String> for Channel {
    type Error = TransportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.to_string()
    }
}

impl From<SocketAddrV4> for Channel {
    fn from(addr: SocketAddrV4) -> Self {
        Self { addr }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}
