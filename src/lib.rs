//! Stream laser range-scan frames over UDP.
//!
//! A scanner produces one [`ScanFrame`] per revolution: 720 angle/distance/quality
//! triples. The publisher splits each frame into six fixed-size datagrams and
//! sends them to any number of unicast or multicast destinations. On the far
//! side a [`ScanProxy`] reassembles fragments into frames and parks them in a
//! lock-free ring, from which application threads take them without blocking.
//!
//! # Features
//!
//! - **Fixed wire format**: 632-byte little-endian fragments, see [`types::wire`]
//! - **Strict reassembly**: in-order fragments only; a gap costs one frame and
//!   the stream resynchronizes on the next frame start
//! - **Bounded memory**: the ring is sized once; when full, new frames are
//!   dropped instead of overwriting unread ones
//! - **Prompt shutdown**: the receive loop is woken by cancellation, not by
//!   the next packet
//!
//! # Quick Start
//!
//! ## Consumer
//!
//! ```rust,no_run
//! use rangecast::{ProxyConfig, Rangecast};
//! use std::net::Ipv4Addr;
//!
//! # fn main() -> rangecast::Result<()> {
//! let proxy = Rangecast::listen(ProxyConfig::multicast(Ipv4Addr::new(239, 110, 88, 88), 8800))?;
//! while let Some(frame) = proxy.try_take_frame() {
//!     for node in frame.nodes() {
//!         println!("{:.2}° {:.1} mm", node.angle_deg, node.distance_mm);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Async consumer
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use rangecast::{ProxyConfig, Rangecast};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> rangecast::Result<()> {
//!     let proxy = Rangecast::listen(ProxyConfig::unicast(9800))?;
//!     let mut frames = proxy.frames(Duration::from_millis(5));
//!     while let Some(frame) = frames.next().await {
//!         println!("frame {}", frame.seq);
//!     }
//!     Ok(())
//! }
//! ```

mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

pub mod config;
pub mod logging;
pub mod proxy;
pub mod publisher;
pub mod reassembly;
pub mod ring;
pub mod stream;
pub mod sync;
pub mod transport;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use config::{ProxyConfig, PublisherConfig};
pub use proxy::{ProxyStats, ScanProxy};
pub use publisher::{PublisherHandle, ScanPublisher, ScanSource};
pub use ring::{FrameReader, FrameWriter, frame_ring};
pub use stream::FrameStream;
pub use transport::{Datagram, Receiver, Sender};

/// Unified entry point for both ends of a scan stream.
///
/// # Examples
///
/// ## Listening
/// ```rust,no_run
/// use rangecast::{ProxyConfig, Rangecast};
///
/// # fn main() -> rangecast::Result<()> {
/// let proxy = Rangecast::listen(ProxyConfig::from_yaml_file("proxy.yaml")?)?;
/// println!("listening on {}", proxy.local_addr());
/// # Ok(())
/// # }
/// ```
///
/// ## Publishing
/// ```rust,no_run
/// use rangecast::{PublisherConfig, Rangecast, ScanFrame, SourceError};
///
/// # fn main() -> rangecast::Result<()> {
/// let source = || -> Result<ScanFrame, SourceError> { Ok(ScanFrame::new()) };
/// let config = PublisherConfig::from_yaml_file("publisher.yaml")?;
/// let handle = Rangecast::publish(source, &config)?;
/// # drop(handle);
/// # Ok(())
/// # }
/// ```
pub struct Rangecast;

impl Rangecast {
    /// Bind a proxy per `config` and start receiving.
    pub fn listen(config: ProxyConfig) -> Result<ScanProxy> {
        let proxy = ScanProxy::new(config)?;
        proxy.start()?;
        Ok(proxy)
    }

    /// Open a sender per `config` and publish frames from `source` on a
    /// background thread.
    pub fn publish<S: ScanSource>(source: S, config: &PublisherConfig) -> Result<PublisherHandle> {
        ScanPublisher::from_config(source, config)?.spawn()
    }
}
