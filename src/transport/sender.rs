//! Fan-out datagram sender

use std::net::UdpSocket;
use tracing::{debug, info, trace};

use super::socket::open_send_socket;
use crate::types::Channel;
use crate::{Result, TransportError};

/// Sends each payload to every registered [`Channel`].
///
/// Delivery is best effort: a failed `sendto` on one channel does not stop
/// the others and is reflected only in the returned byte count.
#[derive(Debug)]
pub struct Sender {
    socket: Option<UdpSocket>,
    channels: Vec<Channel>,
    ttl: u32,
}

impl Sender {
    /// Open the send socket. A `ttl` above zero sets the multicast hop limit.
    pub fn init(ttl: u32) -> Result<Self> {
        let socket = open_send_socket(ttl)?;
        info!(ttl, "Sender initialized");
        Ok(Self { socket: Some(socket), channels: Vec::new(), ttl })
    }

    /// Register a destination. Duplicates are kept and receive duplicate sends.
    pub fn add_channel(&mut self, channel: Channel) {
        debug!(%channel, "Channel added");
        self.channels.push(channel);
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Send `payload` to every channel in registration order.
    ///
    /// Returns the total bytes accepted across channels, which is zero when
    /// no channels are registered or every send failed.
    pub fn send(&self, payload: &[u8]) -> Result<usize> {
        let socket = self.socket.as_ref().ok_or(TransportError::NotInitialized)?;

        let mut total = 0;
        for channel in &self.channels {
            match socket.send_to(payload, channel.socket_addr()) {
                Ok(sent) => total += sent,
                Err(e) => trace!(%channel, error = %e, "Send failed"),
            }
        }
        Ok(total)
    }

    /// Close the socket and forget all channels.
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("Sender closed");
        }
        self.channels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn loopback_listener() -> (UdpSocket, Channel) {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
        socket.set_read_timeout(Some(Duration::from_secs(2))).expect("timeout");
        let port = socket.local_addr().expect("addr").port();
        (socket, Channel::new(Ipv4Addr::LOCALHOST, port))
    }

    #[test]
    fn send_without_channels_reports_zero() {
        let sender = Sender::init(0).expect("init");
        assert_eq!(sender.channel_count(), 0);
        assert_eq!(sender.send(b"hello").expect("send"), 0);
    }

    #[test]
    fn send_sums_bytes_over_channels() {
        let (a, chan_a) = loopback_listener();
        let (b, chan_b) = loopback_listener();

        let mut sender = Sender::init(0).expect("init");
        sender.add_channel(chan_a);
        sender.add_channel(chan_b);

        let payload = [7u8; 632];
        assert_eq!(sender.send(&payload).expect("send"), 2 * payload.len());

        let mut buf = [0u8; 1024];
        for socket in [&a, &b] {
            let (len, _) = socket.recv_from(&mut buf).expect("datagram");
            assert_eq!(&buf[..len], &payload[..]);
        }
    }

    #[test]
    fn send_after_close_fails() {
        let (_listener, channel) = loopback_listener();
        let mut sender = Sender::init(0).expect("init");
        sender.add_channel(channel);
        sender.close();
        sender.close();

        assert!(!sender.is_open());
        assert_eq!(sender.channel_count(), 0);
        assert!(matches!(sender.send(b"x"), Err(TransportError::NotInitialized)));
    }
}
