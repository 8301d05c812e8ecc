//! Datagram receiver with a background listen loop
//!
//! The socket is bound at [`Receiver::init`]. [`Receiver::start_listen`] spawns
//! a dedicated thread running a single-threaded tokio runtime; the loop waits
//! on either a datagram or cancellation, so [`Receiver::stop_listen`] wakes it
//! immediately instead of waiting for the next packet.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use rangecast::transport::Receiver;
//!
//! # fn main() -> rangecast::Result<()> {
//! let receiver = Receiver::init(None, 9800, true)?;
//! receiver.set_callback(|datagram| {
//!     println!("{} bytes from {}", datagram.payload.len(), datagram.source_ip());
//! });
//! receiver.start_listen()?;
//! // ...
//! receiver.stop_listen();
//! # Ok(())
//! # }
//! ```

use parking_lot::Mutex;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket as StdUdpSocket};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::socket::{bind_receive_socket, join_group};
use crate::sync::{RecursiveLock, Worker};
use crate::{Result, TransportError};

/// Largest datagram the receive loop reads in one call.
pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// A received datagram, borrowed for the duration of the callback.
#[derive(Debug, Clone, Copy)]
pub struct Datagram<'a> {
    pub source: SocketAddr,
    pub payload: &'a [u8],
}

impl Datagram<'_> {
    /// Sender address in dotted-decimal form.
    pub fn source_ip(&self) -> String {
        self.source.ip().to_string()
    }
}

type Callback = Box<dyn FnMut(Datagram<'_>) + Send>;

#[derive(Default)]
struct ListenState {
    socket: Option<StdUdpSocket>,
    worker: Option<Worker>,
}

/// Bound UDP socket plus an optional listen loop.
///
/// All methods take `&self`; the receiver can be shared across threads.
/// [`stop_listen`](Receiver::stop_listen) may be called from inside the
/// callback. [`set_callback`](Receiver::set_callback) may not: the callback
/// slot is locked while the callback runs.
pub struct Receiver {
    state: RecursiveLock<ListenState>,
    callback: Arc<Mutex<Option<Callback>>>,
    local_addr: SocketAddr,
    group: Option<Ipv4Addr>,
}

impl Receiver {
    /// Bind to `0.0.0.0:port`, joining `group` when given.
    ///
    /// `allow_port_reuse` lets several receivers on this host share the port.
    pub fn init(group: Option<Ipv4Addr>, port: u16, allow_port_reuse: bool) -> Result<Self> {
        Self::init_on_interface(None, group, port, allow_port_reuse)
    }

    /// Like [`init`](Receiver::init), joining the group on a specific local
    /// interface address.
    pub fn init_on_interface(
        interface: Option<Ipv4Addr>,
        group: Option<Ipv4Addr>,
        port: u16,
        allow_port_reuse: bool,
    ) -> Result<Self> {
        let socket = bind_receive_socket(port, allow_port_reuse)?;
        if let Some(group) = group {
            join_group(&socket, group, interface.unwrap_or(Ipv4Addr::UNSPECIFIED))?;
        }

        let local_addr = socket
            .local_addr()
            .map_err(|source| TransportError::SocketCreateFailed { source })?;
        info!(%local_addr, ?group, reuse = allow_port_reuse, "Receiver bound");

        Ok(Self {
            state: RecursiveLock::new(ListenState { socket: Some(socket), worker: None }),
            callback: Arc::new(Mutex::new(None)),
            local_addr,
            group,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn group(&self) -> Option<Ipv4Addr> {
        self.group
    }

    /// Install the handler invoked for every datagram, replacing any previous one.
    ///
    /// Datagrams arriving while no handler is installed are discarded.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: FnMut(Datagram<'_>) + Send + 'static,
    {
        *self.callback.lock() = Some(Box::new(callback));
    }

    pub fn clear_callback(&self) {
        self.callback.lock().take();
    }

    /// Start the listen loop, stopping a running one first.
    pub fn start_listen(&self) -> Result<()> {
        let guard = self.state.lock();
        self.stop_listen();

        let socket = {
            let state = guard.borrow();
            let socket = state.socket.as_ref().ok_or(TransportError::NotInitialized)?;
            socket.try_clone().map_err(|source| TransportError::SocketCreateFailed { source })?
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| TransportError::RuntimeBuildFailed { source })?;
        let socket = {
            let _enter = runtime.enter();
            UdpSocket::from_std(socket)
                .map_err(|source| TransportError::SocketCreateFailed { source })?
        };

        let callback = Arc::clone(&self.callback);
        let name = format!("udp-recv-{}", self.local_addr.port());
        let worker = Worker::spawn(name, move |cancel| {
            runtime.block_on(receive_loop(socket, callback, cancel));
        })?;

        guard.borrow_mut().worker = Some(worker);
        info!(addr = %self.local_addr, "Listening");
        Ok(())
    }

    /// Stop the listen loop and wait for it to exit. No-op when not listening.
    ///
    /// Called from inside the callback, the loop is cancelled and exits once
    /// the callback returns.
    pub fn stop_listen(&self) {
        let worker = self.state.with(|state| state.worker.take());
        if let Some(worker) = worker {
            worker.stop();
            info!(addr = %self.local_addr, "Stopped listening");
        }
    }

    pub fn is_listening(&self) -> bool {
        self.state.with(|state| state.worker.as_ref().is_some_and(|w| !w.is_finished()))
    }

    /// Stop listening and release the socket. Later starts fail with
    /// [`TransportError::NotInitialized`].
    pub fn close(&self) {
        let _guard = self.state.lock();
        self.stop_listen();
        if self.state.with(|state| state.socket.take()).is_some() {
            debug!(addr = %self.local_addr, "Receiver closed");
        }
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.stop_listen();
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("local_addr", &self.local_addr)
            .field("group", &self.group)
            .field("listening", &self.is_listening())
            .finish()
    }
}

async fn receive_loop(
    socket: UdpSocket,
    callback: Arc<Mutex<Option<Callback>>>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    debug!("Receive loop started");

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Receive loop cancelled");
                break;
            }
            result = socket.recv_from(&mut buf) => result,
        };

        match result {
            Ok((0, _)) => continue,
            Ok((len, source)) => {
                trace!(%source, len, "Datagram received");
                if let Some(handler) = callback.lock().as_mut() {
                    handler(Datagram { source, payload: &buf[..len] });
                }
            }
            Err(e) => {
                warn!(error = %e, "Receive failed");
            }
        }
    }
}
