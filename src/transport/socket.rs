//! Socket construction shared by sender and receiver

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use tracing::debug;

use crate::{Result, TransportError};

fn new_udp_socket() -> Result<Socket> {
    Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|source| TransportError::SocketCreateFailed { source })
}

/// Open an unbound socket for sending, setting the multicast TTL when `ttl > 0`.
pub(crate) fn open_send_socket(ttl: u32) -> Result<UdpSocket> {
    let socket = new_udp_socket()?;
    if ttl > 0 {
        socket
            .set_multicast_ttl_v4(ttl)
            .map_err(|e| TransportError::option_failed("IP_MULTICAST_TTL", e))?;
        debug!(ttl, "Multicast TTL set");
    }
    Ok(socket.into())
}

/// Bind a non-blocking receive socket to `0.0.0.0:port`.
pub(crate) fn bind_receive_socket(port: u16, reuse: bool) -> Result<UdpSocket> {
    let socket = new_udp_socket()?;
    if reuse {
        socket
            .set_reuse_address(true)
            .map_err(|e| TransportError::option_failed("SO_REUSEADDR", e))?;
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&addr.into()).map_err(|e| TransportError::from_bind_error(addr, e))?;
    socket.set_nonblocking(true).map_err(|e| TransportError::option_failed("O_NONBLOCK", e))?;

    Ok(socket.into())
}

/// Join `group` on `interface` (`0.0.0.0` lets the kernel choose).
pub(crate) fn join_group(socket: &UdpSocket, group: Ipv4Addr, interface: Ipv4Addr) -> Result<()> {
    socket
        .join_multicast_v4(&group, &interface)
        .map_err(|source| TransportError::MulticastJoinFailed { group, interface, source })?;
    debug!(%group, %interface, "Joined multicast group");
    Ok(())
}
