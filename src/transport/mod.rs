//! UDP unicast and multicast transport
//!
//! - [`Sender`] fans one payload out to a list of [`Channel`](crate::types::Channel)s.
//! - [`Receiver`] binds a port (optionally joining a multicast group) and runs
//!   a background loop that hands each datagram to a callback.
//!
//! Neither side interprets payloads; framing lives in [`crate::reassembly`].

mod receiver;
mod sender;
mod socket;

pub use receiver::{Datagram, MAX_DATAGRAM_SIZE, Receiver};
pub use sender::Sender;
