//! Concurrency primitives
//!
//! Small building blocks used by the transport and publisher:
//!
//! - [`RecursiveLock`]: a lock the owning thread may re-acquire, for state whose
//!   operations compose (restarting a listener is stop + start under one hold)
//! - [`Event`]: a manual-reset event built on a mutex and condition variable
//! - [`Worker`]: a named background thread with cooperative cancellation and
//!   explicit join/detach/stop
//!
//! Construction of OS threads can fail; [`Worker::spawn`] reports that as an
//! error rather than panicking.

mod event;
mod lock;
mod worker;

pub use event::Event;
pub use lock::{RecursiveGuard, RecursiveLock};
pub use worker::Worker;
